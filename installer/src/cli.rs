//! CLI argument definitions for the distribution installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::context::InstallOptions;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::LevelFilter;

/// Build and install the Ruby Enterprise Edition source distribution.
#[derive(Parser, Debug, Clone)]
#[command(name = "ree-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Build and install the Ruby Enterprise Edition source distribution.\n\n",
    "The installer checks that the host can compile the distribution, asks ",
    "where to install it, then configures, compiles and installs the memory ",
    "allocator, the runtime and the bundled package manager.\n\n",
    "Re-running the installer with the same prefix reuses the existing build ",
    "configuration.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install interactively:\n",
    "    $ ree-installer\n\n",
    "  Install to /opt/ree without prompting:\n",
    "    $ ree-installer --auto /opt/ree\n\n",
    "  Stage the installation for packaging:\n",
    "    $ ree-installer --auto /opt/ree --destdir /tmp/pkgroot\n\n",
    "  Skip the replacement memory allocator:\n",
    "    $ ree-installer --no-tcmalloc",
))]
pub struct Cli {
    /// Install to PREFIX without prompting.
    #[arg(long, value_name = "PREFIX")]
    pub auto: Option<String>,

    /// Stage installed files under DIR instead of the live filesystem.
    #[arg(long, value_name = "DIR")]
    pub destdir: Option<String>,

    /// Do not build the replacement memory allocator.
    #[arg(long)]
    pub no_tcmalloc: bool,

    /// Also install the extra package set.
    #[arg(long)]
    pub extra_packages: bool,

    /// Root of the unpacked distribution.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dist_dir: Utf8PathBuf,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Default for Cli {
    /// An interactive run from the current directory with no options set.
    ///
    /// # Examples
    ///
    /// ```
    /// use ree_installer::cli::Cli;
    ///
    /// let cli = Cli::default();
    /// assert!(cli.auto.is_none());
    /// assert_eq!(cli.dist_dir, ".");
    /// ```
    fn default() -> Self {
        Self {
            auto: None,
            destdir: None,
            no_tcmalloc: false,
            extra_packages: false,
            dist_dir: Utf8PathBuf::from("."),
            verbosity: 0,
            quiet: false,
        }
    }
}

impl Cli {
    /// The staging root, treating an empty `--destdir` as none.
    #[must_use]
    pub fn staging_root(&self) -> Option<&Utf8Path> {
        self.destdir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(Utf8Path::new)
    }

    /// The installation options selected on the command line.
    #[must_use]
    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            staging_root: self.staging_root().map(Utf8Path::to_path_buf),
            allocator_opt_out: self.no_tcmalloc,
            extra_packages: self.extra_packages,
        }
    }

    /// Whether the session runs without prompts.
    #[must_use]
    pub const fn is_non_interactive(&self) -> bool {
        self.auto.is_some()
    }

    /// The log level implied by `-q` and `-v`.
    ///
    /// # Examples
    ///
    /// ```
    /// use log::LevelFilter;
    /// use ree_installer::cli::Cli;
    ///
    /// let cli = Cli { verbosity: 2, ..Cli::default() };
    /// assert_eq!(cli.log_level(), LevelFilter::Debug);
    /// ```
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
