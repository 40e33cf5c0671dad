//! Structured command execution.
//!
//! Every external program the installer runs (compiler probes, `configure`,
//! `make`, the bundled package manager) is described by a [`CommandSpec`]
//! and handed to a [`CommandExecutor`]. Arguments travel as a vector and are
//! never joined into a shell string.

use crate::error::{InstallerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::process::{Command, Output};

/// A program invocation with its arguments, working directory and
/// environment overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<Utf8PathBuf>,
    env: Vec<(String, String)>,
    captured: bool,
}

impl CommandSpec {
    /// Create a command for the given program.
    ///
    /// # Examples
    ///
    /// ```
    /// use ree_installer::exec::CommandSpec;
    ///
    /// let spec = CommandSpec::new("make").arg("install").env("DESTDIR", "/tmp/stage");
    /// assert_eq!(spec.display_line(), "make install");
    /// assert_eq!(spec.env_vars(), &[("DESTDIR".to_owned(), "/tmp/stage".to_owned())]);
    /// ```
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            captured: false,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from the given directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set one environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set several environment variables for the child.
    #[must_use]
    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend(vars.iter().cloned());
        self
    }

    /// Capture stdout and stderr instead of inheriting the terminal.
    #[must_use]
    pub fn captured(mut self) -> Self {
        self.captured = true;
        self
    }

    /// The program to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument vector.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if one was set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.current_dir.as_deref()
    }

    /// Environment variables layered over the inherited environment.
    #[must_use]
    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Whether output is captured.
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        self.captured
    }

    /// Render the program and arguments for logs and user guidance.
    #[must_use]
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Runs a command to completion and returns its output.
    ///
    /// Uncaptured commands inherit the terminal, so the returned output
    /// carries only the exit status.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Spawn`] if the program cannot be started.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ree_installer::exec::{CommandExecutor, CommandSpec, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run(&CommandSpec::new("uname").arg("-m").captured())?;
    /// assert!(output.status.success());
    /// # Ok::<(), ree_installer::error::InstallerError>(())
    /// ```
    fn run(&self, command: &CommandSpec) -> Result<Output>;
}

/// Executes commands on the host system, blocking until they exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, command: &CommandSpec) -> Result<Output> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments());
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }
        cmd.envs(command.env_vars().iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!("running: {}", command.display_line());

        let spawn_error = |source: std::io::Error| InstallerError::Spawn {
            program: command.program().to_owned(),
            source,
        };

        if command.is_captured() {
            return cmd.output().map_err(spawn_error);
        }

        let status = cmd.status().map_err(spawn_error)?;
        Ok(Output {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

/// Returns true if the given command executes successfully.
#[must_use]
pub fn command_succeeds(executor: &dyn CommandExecutor, command: &CommandSpec) -> bool {
    executor.run(command).is_ok_and(|o| o.status.success())
}

/// Summarise a failed command for error messages.
#[must_use]
pub fn failure_reason(command: &CommandSpec, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        format!("`{}` exited with {}", command.display_line(), output.status)
    } else {
        format!("`{}` failed: {trimmed}", command.display_line())
    }
}
