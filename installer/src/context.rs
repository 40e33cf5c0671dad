//! Mutable session state shared by the planner and executor.
//!
//! The context is created once at session start. Only platform detection
//! ([`InstallationContext::apply_platform`]) and prefix selection
//! ([`InstallationContext::select_prefix`]) change it; every later stage
//! reads it.
//!
//! Paths used while building refer to the staged copy of the prefix
//! (`<staging root><prefix>/...`). The recorded marker and rewritten shebangs
//! use the final prefix.

use crate::platform::{OsFamily, PlatformInfo};
use camino::{Utf8Path, Utf8PathBuf};

/// Include-path variables augmented with the staged include directory.
pub const INCLUDE_PATH_VARS: &[&str] = &["CPATH", "C_INCLUDE_PATH"];

/// Options chosen on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Root that installed files are staged under, if any.
    pub staging_root: Option<Utf8PathBuf>,
    /// Never build the replacement allocator.
    pub allocator_opt_out: bool,
    /// Install the extra package set.
    pub extra_packages: bool,
}

/// State of one installation session.
#[derive(Debug, Clone)]
pub struct InstallationContext {
    dist_root: Utf8PathBuf,
    prefix: Utf8PathBuf,
    previous_prefix: Option<Utf8PathBuf>,
    options: InstallOptions,
    os: OsFamily,
    machine: String,
    is_64bit: bool,
    inherited_paths: Vec<(String, String)>,
}

impl InstallationContext {
    /// Start a session for the distribution at `dist_root`.
    ///
    /// The proposed prefix is the previously recorded one if present,
    /// otherwise `default_prefix`.
    #[must_use]
    pub fn new(
        dist_root: impl Into<Utf8PathBuf>,
        default_prefix: Utf8PathBuf,
        previous_prefix: Option<Utf8PathBuf>,
        options: InstallOptions,
    ) -> Self {
        let prefix = previous_prefix.clone().unwrap_or(default_prefix);
        Self {
            dist_root: dist_root.into(),
            prefix,
            previous_prefix,
            options,
            os: OsFamily::current(),
            machine: std::env::consts::ARCH.to_owned(),
            is_64bit: cfg!(target_pointer_width = "64"),
            inherited_paths: Vec::new(),
        }
    }

    /// Record the detected platform and the process's current search paths.
    pub fn apply_platform(&mut self, platform: &PlatformInfo) {
        self.apply_platform_with_env(platform, |name| std::env::var(name).ok());
    }

    /// Record the detected platform, reading inherited search paths through
    /// `lookup`.
    pub fn apply_platform_with_env(
        &mut self,
        platform: &PlatformInfo,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        self.os = platform.os;
        self.machine = platform.architecture.machine().to_owned();
        self.is_64bit = platform.architecture.is_64bit();
        self.inherited_paths = self
            .path_vars()
            .into_iter()
            .filter_map(|name| {
                lookup(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.to_owned(), value))
            })
            .collect();
    }

    /// Fix the installation prefix for the rest of the session.
    pub fn select_prefix(&mut self, prefix: Utf8PathBuf) {
        self.prefix = prefix;
    }

    /// Root directory of the distribution.
    #[must_use]
    pub fn dist_root(&self) -> &Utf8Path {
        &self.dist_root
    }

    /// The installation prefix: the proposed one until a prefix is selected.
    #[must_use]
    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    /// Prefix recorded by the previous run, if any.
    #[must_use]
    pub fn previous_prefix(&self) -> Option<&Utf8Path> {
        self.previous_prefix.as_deref()
    }

    /// Whether the prefix equals the one recorded by the previous run.
    #[must_use]
    pub fn prefix_unchanged(&self) -> bool {
        self.previous_prefix.as_deref() == Some(self.prefix.as_path())
    }

    /// Root that installed files are staged under, if any.
    #[must_use]
    pub fn staging_root(&self) -> Option<&Utf8Path> {
        self.options.staging_root.as_deref()
    }

    /// Whether the allocator was opted out of.
    #[must_use]
    pub const fn allocator_opt_out(&self) -> bool {
        self.options.allocator_opt_out
    }

    /// Whether the extra package set was requested.
    #[must_use]
    pub const fn extra_packages(&self) -> bool {
        self.options.extra_packages
    }

    /// Operating-system family of the host.
    #[must_use]
    pub const fn os(&self) -> OsFamily {
        self.os
    }

    /// Machine name of the host.
    #[must_use]
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Whether the host is 64-bit.
    #[must_use]
    pub const fn is_64bit(&self) -> bool {
        self.is_64bit
    }

    /// Map an installed path to where it lives during the build.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use ree_installer::context::{InstallOptions, InstallationContext};
    ///
    /// let options = InstallOptions {
    ///     staging_root: Some("/tmp/stage".into()),
    ///     ..InstallOptions::default()
    /// };
    /// let context = InstallationContext::new("/dist", "/opt/x".into(), None, options);
    /// assert_eq!(context.staged(Utf8Path::new("/opt/x/bin")), "/tmp/stage/opt/x/bin");
    /// ```
    #[must_use]
    pub fn staged(&self, path: &Utf8Path) -> Utf8PathBuf {
        match self.staging_root() {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_owned(),
        }
    }

    /// The staged prefix.
    #[must_use]
    pub fn staged_prefix(&self) -> Utf8PathBuf {
        self.staged(&self.prefix)
    }

    /// Staged `bin` directory of the prefix.
    #[must_use]
    pub fn installed_bin_dir(&self) -> Utf8PathBuf {
        self.staged_prefix().join("bin")
    }

    /// Staged `lib` directory of the prefix.
    #[must_use]
    pub fn installed_lib_dir(&self) -> Utf8PathBuf {
        self.staged_prefix().join("lib")
    }

    /// Staged `include` directory of the prefix.
    #[must_use]
    pub fn installed_include_dir(&self) -> Utf8PathBuf {
        self.staged_prefix().join("include")
    }

    /// Staged path of an executable installed under `bin`.
    #[must_use]
    pub fn installed_executable(&self, name: &str) -> Utf8PathBuf {
        self.installed_bin_dir().join(name)
    }

    /// Environment overlay handed to every child process.
    ///
    /// Include and library search paths are prefixed with the staged
    /// include and library directories so components built later find the
    /// ones installed earlier.
    #[must_use]
    pub fn child_env(&self) -> Vec<(String, String)> {
        let include = self.installed_include_dir();
        let lib = self.installed_lib_dir();
        self.path_vars()
            .into_iter()
            .map(|name| {
                let dir = if INCLUDE_PATH_VARS.contains(&name) {
                    &include
                } else {
                    &lib
                };
                let inherited = self
                    .inherited_paths
                    .iter()
                    .find(|(var, _)| var == name)
                    .map(|(_, value)| value.as_str());
                let value = match inherited {
                    Some(rest) => format!("{dir}:{rest}"),
                    None => dir.to_string(),
                };
                (name.to_owned(), value)
            })
            .collect()
    }

    fn path_vars(&self) -> Vec<&'static str> {
        let mut vars = INCLUDE_PATH_VARS.to_vec();
        vars.push("LIBRARY_PATH");
        vars.push(self.os.linker_path_var());
        vars
    }
}
