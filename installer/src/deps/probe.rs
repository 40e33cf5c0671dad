//! Lazy capability probes.
//!
//! A [`Capability`] holds its probe state explicitly: it starts
//! [`ProbeState::Unevaluated`] and moves to [`ProbeState::Evaluated`] the
//! first time [`Capability::probe`] runs. Header checks compile a scratch
//! translation unit with the detected C compiler.

use crate::exec::{CommandExecutor, CommandSpec, command_succeeds};
use crate::platform::{CompilerKind, PlatformInfo};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace};
use std::cell::RefCell;
use std::fs;

/// Stem of the scratch files written by compile tests.
///
/// The name is fixed, so two installers probing at once in the same temp
/// directory race on it.
pub const SCRATCH_STEM: &str = "ree-check";

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Found, at the given path.
    FoundAt(Utf8PathBuf),
    /// Found, with no meaningful path.
    Found,
    /// Not found.
    NotFound,
}

impl ProbeResult {
    /// Whether the capability is present.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// The path the capability was found at, if the probe reports one.
    #[must_use]
    pub fn found_at(&self) -> Option<&Utf8Path> {
        match self {
            Self::FoundAt(path) => Some(path),
            Self::Found | Self::NotFound => None,
        }
    }
}

/// Evaluation state of a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeState {
    /// The probe has not run.
    Unevaluated,
    /// The probe ran and produced this result.
    Evaluated(ProbeResult),
}

/// How a capability is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// The compiler of the given kind was discovered on the host.
    Compiler(CompilerKind),
    /// A translation unit including these headers, in order, compiles.
    Headers(&'static [&'static str]),
}

/// Remediation data attached to a capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remediation {
    /// A package-manager command that installs the capability.
    pub install_command: Option<String>,
    /// Free-text installation instructions.
    pub instructions: Option<String>,
    /// Project website.
    pub website: Option<String>,
}

impl Remediation {
    /// The most specific advice available.
    ///
    /// # Examples
    ///
    /// ```
    /// use ree_installer::deps::{Advice, Remediation};
    ///
    /// let remediation = Remediation {
    ///     install_command: Some("apt-get install zlib1g-dev".to_owned()),
    ///     instructions: None,
    ///     website: Some("http://www.zlib.net/".to_owned()),
    /// };
    /// assert_eq!(
    ///     remediation.advice(),
    ///     Advice::Command("apt-get install zlib1g-dev".to_owned())
    /// );
    /// assert_eq!(Remediation::default().advice(), Advice::Generic);
    /// ```
    #[must_use]
    pub fn advice(&self) -> Advice {
        if let Some(command) = &self.install_command {
            Advice::Command(command.clone())
        } else if let Some(instructions) = &self.instructions {
            Advice::Instructions(instructions.clone())
        } else if let Some(website) = &self.website {
            Advice::Website(website.clone())
        } else {
            Advice::Generic
        }
    }
}

/// A single piece of remediation advice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advice {
    /// Run this command as root.
    Command(String),
    /// Follow these instructions.
    Instructions(String),
    /// Download from this website.
    Website(String),
    /// No specific advice is known; search for the capability by name.
    Generic,
}

/// A required external capability.
#[derive(Debug)]
pub struct Capability {
    name: String,
    check: Check,
    remediation: Remediation,
    state: RefCell<ProbeState>,
}

impl Capability {
    /// Declare a capability. Nothing is probed until [`Capability::probe`].
    #[must_use]
    pub fn new(name: impl Into<String>, check: Check, remediation: Remediation) -> Self {
        Self {
            name: name.into(),
            check,
            remediation,
            state: RefCell::new(ProbeState::Unevaluated),
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the capability is verified.
    #[must_use]
    pub const fn check(&self) -> Check {
        self.check
    }

    /// Remediation data.
    #[must_use]
    pub const fn remediation(&self) -> &Remediation {
        &self.remediation
    }

    /// Current evaluation state.
    #[must_use]
    pub fn state(&self) -> ProbeState {
        self.state.borrow().clone()
    }

    /// Probe the capability, running the check at most once.
    #[must_use]
    pub fn probe(&self, prober: &Prober<'_>) -> ProbeResult {
        if let ProbeState::Evaluated(result) = &*self.state.borrow() {
            return result.clone();
        }
        let result = prober.run(self.check);
        debug!("probed {}: {result:?}", self.name);
        *self.state.borrow_mut() = ProbeState::Evaluated(result.clone());
        result
    }
}

/// Runs checks against the detected platform.
pub struct Prober<'a> {
    platform: &'a PlatformInfo,
    executor: &'a dyn CommandExecutor,
    scratch_dir: Utf8PathBuf,
    cflags: Vec<String>,
}

impl<'a> Prober<'a> {
    /// Create a prober using the system temp directory and the `CFLAGS`
    /// environment variable.
    #[must_use]
    pub fn new(platform: &'a PlatformInfo, executor: &'a dyn CommandExecutor) -> Self {
        let scratch_dir = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
        let cflags = std::env::var("CFLAGS")
            .map(|flags| split_flags(&flags))
            .unwrap_or_default();
        Self {
            platform,
            executor,
            scratch_dir,
            cflags,
        }
    }

    /// Write scratch files to `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Use these compiler flags instead of `CFLAGS`.
    #[must_use]
    pub fn with_cflags(mut self, cflags: &str) -> Self {
        self.cflags = split_flags(cflags);
        self
    }

    /// Run a check.
    #[must_use]
    pub fn run(&self, check: Check) -> ProbeResult {
        match check {
            Check::Compiler(CompilerKind::C) => found_compiler(self.platform.c_compiler.as_ref()),
            Check::Compiler(CompilerKind::Cxx) => {
                found_compiler(self.platform.cxx_compiler.as_ref())
            }
            Check::Headers(headers) => self.compile_test(headers),
        }
    }

    /// Compile a translation unit including `headers`.
    ///
    /// Never fails: a scratch file that cannot be written, a compiler that
    /// cannot be spawned and a failed compile all report not-found. The
    /// scratch source and object files are removed on every path.
    #[must_use]
    pub fn compile_test(&self, headers: &[&str]) -> ProbeResult {
        let scratch = ScratchFiles::new(&self.scratch_dir);
        let source: String = headers
            .iter()
            .map(|header| format!("#include <{header}>\n"))
            .collect();
        if let Err(err) = fs::write(&scratch.source, source) {
            debug!("cannot write {}: {err}", scratch.source);
            return ProbeResult::NotFound;
        }

        let command = CommandSpec::new(self.platform.c_compiler_command())
            .args(self.cflags.iter().cloned())
            .arg("-c")
            .arg(format!("{SCRATCH_STEM}.c"))
            .current_dir(self.scratch_dir.clone())
            .captured();
        if command_succeeds(self.executor, &command) {
            ProbeResult::Found
        } else {
            ProbeResult::NotFound
        }
    }
}

fn found_compiler(path: Option<&Utf8PathBuf>) -> ProbeResult {
    path.map_or(ProbeResult::NotFound, |path| ProbeResult::FoundAt(path.clone()))
}

fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_owned).collect()
}

/// Removes the compile-test source and object file when dropped.
struct ScratchFiles {
    source: Utf8PathBuf,
    object: Utf8PathBuf,
}

impl ScratchFiles {
    fn new(dir: &Utf8Path) -> Self {
        Self {
            source: dir.join(format!("{SCRATCH_STEM}.c")),
            object: dir.join(format!("{SCRATCH_STEM}.o")),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.source, &self.object] {
            match fs::remove_file(path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                    trace!("cannot remove {path}: {err}");
                }
                _ => {}
            }
        }
    }
}
