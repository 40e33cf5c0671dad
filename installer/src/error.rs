//! Error types for the installer.
//!
//! This module defines semantic error variants that provide actionable guidance
//! to users when installation fails. Each error includes recovery hints where
//! applicable, and maps onto the process exit code reported by the binary.

use crate::deps::MissingDependency;
use crate::plan::Step;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Exit code for a successful installation.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for a missing dependency or a failed build step.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for an installation the user aborted at a prompt.
pub const EXIT_USER_ABORT: i32 = 2;

/// Privilege level of the process that attempted an install step.
///
/// The `Display` form is the recovery advice shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// The installer runs as the superuser.
    Root,
    /// The installer runs as an ordinary user with the given login name.
    User(String),
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(
                f,
                "the installer lacks permission to write there even though it runs as root; \
                 fix the directory permissions and re-run the installer"
            ),
            Self::User(user) => write!(
                f,
                "the installer runs as {user} and lacks permission to write there; \
                 re-run the installer as root"
            ),
        }
    }
}

/// Errors that can occur during the installation process.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// One or more required dependencies are not installed.
    ///
    /// All dependencies are checked before this is raised, so the list is
    /// complete for the host.
    #[error("required software is missing: {}", dependency_names(.missing))]
    MissingDependencies {
        /// Every dependency that failed its probe, in declaration order.
        missing: Vec<MissingDependency>,
    },

    /// A build step failed; later steps were not run.
    #[error("step {step} failed: {reason}")]
    StepFailed {
        /// The step that failed.
        step: Step,
        /// Description of the failure.
        reason: String,
    },

    /// An install step could not write to the installation prefix.
    #[error("step {step} could not install files to {prefix}: {privilege}")]
    InstallPermission {
        /// The install step that failed.
        step: Step,
        /// The prefix the step tried to install into.
        prefix: Utf8PathBuf,
        /// Privilege level of the installer process.
        privilege: Privilege,
    },

    /// The user cancelled an interactive prompt.
    #[error("installation aborted by user")]
    UserAbort,

    /// The requested installation prefix is unusable.
    #[error("invalid installation prefix {input:?}: {reason}")]
    InvalidPrefix {
        /// The prefix as entered.
        input: String,
        /// Why the prefix was rejected.
        reason: &'static str,
    },

    /// No distribution was found at the given directory.
    #[error("no distribution found at {path}: expected distribution.toml or version.txt")]
    DistributionNotFound {
        /// Directory that was searched.
        path: Utf8PathBuf,
    },

    /// The distribution manifest could not be parsed.
    #[error("invalid distribution manifest at {path}: {reason}")]
    InvalidManifest {
        /// Path to the manifest.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// A step attempted an illegal state transition.
    #[error("step {step} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The step whose state was being changed.
        step: Step,
        /// Current state name.
        from: &'static str,
        /// Requested state name.
        to: &'static str,
    },

    /// An external program could not be started.
    #[error("failed to run {program}")]
    Spawn {
        /// The program that could not be started.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The previous-prefix marker could not be written.
    #[error("failed to record installation prefix in {path}")]
    MarkerWrite {
        /// Path to the marker file.
        path: Utf8PathBuf,
        /// The underlying write error.
        #[source]
        source: std::io::Error,
    },

    /// A path outside the UTF-8 domain was encountered.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallerError {
    /// Return the process exit code for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use ree_installer::error::{EXIT_FAILURE, EXIT_USER_ABORT, InstallerError};
    ///
    /// assert_eq!(InstallerError::UserAbort.exit_code(), EXIT_USER_ABORT);
    /// let missing = InstallerError::MissingDependencies { missing: Vec::new() };
    /// assert_eq!(missing.exit_code(), EXIT_FAILURE);
    /// ```
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::UserAbort => EXIT_USER_ABORT,
            _ => EXIT_FAILURE,
        }
    }
}

fn dependency_names(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(|dependency| dependency.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;
