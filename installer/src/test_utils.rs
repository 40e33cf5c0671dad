//! Shared test utilities for the installer crate.

use crate::exec::{CommandExecutor, CommandSpec};
use crate::error::Result;
use crate::platform::{Architecture, DistroIdentity, Invoker, OsFamily, PlatformInfo};
use camino::Utf8PathBuf;
use std::cell::RefCell;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Builds a platform description with both compilers present and an
/// unprivileged invoker named `builder`.
#[must_use]
pub fn platform_info(os: OsFamily, distro: DistroIdentity, machine: &str) -> PlatformInfo {
    PlatformInfo {
        os,
        distro,
        architecture: Architecture::from_machine(machine),
        c_compiler: Some(Utf8PathBuf::from("/usr/bin/gcc")),
        cxx_compiler: Some(Utf8PathBuf::from("/usr/bin/g++")),
        invoker: Invoker {
            privileged: false,
            user: "builder".to_owned(),
        },
    }
}

/// A 64-bit Ubuntu host.
#[must_use]
pub fn linux_platform() -> PlatformInfo {
    platform_info(OsFamily::Linux, DistroIdentity::Ubuntu, "x86_64")
}

type Effect = Box<dyn Fn(&CommandSpec)>;

/// A `CommandExecutor` that records every invocation.
///
/// Commands succeed with empty output unless a scripted response matches.
/// A response matches when its needle is a substring of the command's
/// [`CommandSpec::display_line`]; the first matching response wins.
/// Effects run before the response is returned, which lets tests mimic the
/// files a real `configure` or compiler would leave behind.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: RefCell<Vec<CommandSpec>>,
    responses: Vec<(String, Output)>,
    effects: Vec<(String, Effect)>,
}

impl RecordingExecutor {
    /// Creates an executor on which every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands containing `needle` with `output`.
    #[must_use]
    pub fn responding(mut self, needle: &str, output: Output) -> Self {
        self.responses.push((needle.to_owned(), output));
        self
    }

    /// Fails commands containing `needle` with exit status 1.
    #[must_use]
    pub fn failing_on(self, needle: &str) -> Self {
        self.responding(needle, failure_output(""))
    }

    /// Runs `effect` whenever a command containing `needle` is executed.
    #[must_use]
    pub fn with_effect(mut self, needle: &str, effect: impl Fn(&CommandSpec) + 'static) -> Self {
        self.effects.push((needle.to_owned(), Box::new(effect)));
        self
    }

    /// Every command received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// The display line of every command received so far.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(CommandSpec::display_line).collect()
    }

    /// Number of received commands containing `needle`.
    #[must_use]
    pub fn count_matching(&self, needle: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn run(&self, command: &CommandSpec) -> Result<Output> {
        self.calls.borrow_mut().push(command.clone());
        let line = command.display_line();

        for (needle, effect) in &self.effects {
            if line.contains(needle.as_str()) {
                effect(command);
            }
        }

        let output = self
            .responses
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map_or_else(success_output, |(_, output)| output.clone());
        Ok(output)
    }
}
