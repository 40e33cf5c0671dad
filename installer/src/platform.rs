//! Host platform detection.
//!
//! This module discovers the compilers, operating-system family, Linux
//! distribution, machine architecture and invoking user. Detection runs once
//! per session through [`PlatformProbe::detect`]; the resulting
//! [`PlatformInfo`] is an immutable value passed by reference to every later
//! component.

use crate::error::Privilege;
use crate::exec::{CommandExecutor, CommandSpec};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace};
use std::ffi::OsStr;
use std::fmt;

/// Machine names reported by `uname -m` on 64-bit hosts.
pub const SIXTY_FOUR_BIT_MACHINES: &[&str] = &[
    "x86_64", "amd64", "ia64", "ppc64", "ppc64le", "sparc64", "s390x", "aarch64", "arm64",
    "mips64",
];

/// Operating-system family of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Linux, any distribution.
    Linux,
    /// macOS.
    MacOs,
    /// FreeBSD.
    FreeBsd,
    /// Solaris or illumos.
    Solaris,
    /// Any other host.
    Other,
}

impl OsFamily {
    /// Detect the family of the running host.
    #[must_use]
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Classify an OS name as reported by `std::env::consts::OS`.
    #[must_use]
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "freebsd" => Self::FreeBsd,
            "solaris" | "illumos" => Self::Solaris,
            _ => Self::Other,
        }
    }

    /// File extension of shared libraries on this family.
    #[must_use]
    pub const fn library_extension(self) -> &'static str {
        match self {
            Self::MacOs => "dylib",
            _ => "so",
        }
    }

    /// File extension of loadable runtime extensions on this family.
    #[must_use]
    pub const fn extension_suffix(self) -> &'static str {
        match self {
            Self::MacOs => "bundle",
            _ => "so",
        }
    }

    /// Whether the dynamic linker resolves symbols against their originating
    /// library, which stops a replacement allocator from overriding the
    /// allocator functions used by other libraries.
    #[must_use]
    pub const fn uses_two_level_namespace(self) -> bool {
        matches!(self, Self::MacOs)
    }

    /// Environment variable holding the dynamic-linker search path.
    #[must_use]
    pub const fn linker_path_var(self) -> &'static str {
        match self {
            Self::MacOs => "DYLD_LIBRARY_PATH",
            _ => "LD_LIBRARY_PATH",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::FreeBsd => "freebsd",
            Self::Solaris => "solaris",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Linux distribution family, used only to pick remediation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistroIdentity {
    /// Ubuntu.
    Ubuntu,
    /// Debian or a derivative without an lsb-release marker.
    Debian,
    /// CentOS.
    CentOs,
    /// Fedora.
    Fedora,
    /// Red Hat Enterprise Linux or another Red Hat derivative.
    Rhel,
    /// SUSE.
    Suse,
    /// Gentoo.
    Gentoo,
    /// A Linux host with no recognised marker file.
    Unknown,
    /// The host is not running Linux.
    NotLinux,
}

impl DistroIdentity {
    /// Whether the distribution uses `apt-get`.
    #[must_use]
    pub const fn is_debian_family(self) -> bool {
        matches!(self, Self::Ubuntu | Self::Debian)
    }

    /// Whether the distribution uses `yum`.
    #[must_use]
    pub const fn is_redhat_family(self) -> bool {
        matches!(self, Self::CentOs | Self::Fedora | Self::Rhel)
    }
}

/// Machine architecture as reported by the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    machine: String,
    is_64bit: bool,
}

impl Architecture {
    /// Classify a machine name.
    ///
    /// # Examples
    ///
    /// ```
    /// use ree_installer::platform::Architecture;
    ///
    /// assert!(Architecture::from_machine("x86_64").is_64bit());
    /// assert!(!Architecture::from_machine("i686").is_64bit());
    /// ```
    #[must_use]
    pub fn from_machine(machine: &str) -> Self {
        let machine = machine.trim().to_owned();
        let is_64bit = SIXTY_FOUR_BIT_MACHINES.contains(&machine.as_str());
        Self { machine, is_64bit }
    }

    /// The machine name, e.g. `x86_64`.
    #[must_use]
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Whether the machine is 64-bit.
    #[must_use]
    pub const fn is_64bit(&self) -> bool {
        self.is_64bit
    }
}

/// The user running the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    /// Whether the effective user is the superuser.
    pub privileged: bool,
    /// Login name of the effective user.
    pub user: String,
}

impl Invoker {
    /// The privilege level used in install-failure guidance.
    #[must_use]
    pub fn privilege(&self) -> Privilege {
        if self.privileged {
            Privilege::Root
        } else {
            Privilege::User(self.user.clone())
        }
    }
}

/// Everything the installer knows about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Operating-system family.
    pub os: OsFamily,
    /// Linux distribution family.
    pub distro: DistroIdentity,
    /// Machine architecture.
    pub architecture: Architecture,
    /// Path to the C compiler, if one was found.
    pub c_compiler: Option<Utf8PathBuf>,
    /// Path to the C++ compiler, if one was found.
    pub cxx_compiler: Option<Utf8PathBuf>,
    /// The user running the installer.
    pub invoker: Invoker,
}

impl PlatformInfo {
    /// File extension of shared libraries on this host.
    #[must_use]
    pub const fn library_extension(&self) -> &'static str {
        self.os.library_extension()
    }

    /// File extension of loadable runtime extensions on this host.
    #[must_use]
    pub const fn extension_suffix(&self) -> &'static str {
        self.os.extension_suffix()
    }

    /// The C compiler to invoke: the detected one, or a generic `gcc`.
    #[must_use]
    pub fn c_compiler_command(&self) -> &str {
        self.c_compiler.as_ref().map_or("gcc", |path| path.as_str())
    }
}

/// Which compiler to discover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerKind {
    /// The C compiler (`CC`, then `gcc`, then `cc`).
    C,
    /// The C++ compiler (`CXX`, then `g++`, then `c++`).
    Cxx,
}

impl CompilerKind {
    /// Environment variable that overrides discovery.
    #[must_use]
    pub const fn override_var(self) -> &'static str {
        match self {
            Self::C => "CC",
            Self::Cxx => "CXX",
        }
    }

    /// Executable names searched for, in order.
    #[must_use]
    pub const fn candidates(self) -> &'static [&'static str] {
        match self {
            Self::C => &["gcc", "cc"],
            Self::Cxx => &["g++", "c++"],
        }
    }
}

/// Discover a compiler from the process environment and `PATH`.
#[must_use]
pub fn discover_compiler(kind: CompilerKind) -> Option<Utf8PathBuf> {
    let override_value = std::env::var(kind.override_var()).ok();
    let search_path = std::env::var_os("PATH");
    find_compiler(
        override_value.as_deref(),
        kind.candidates(),
        search_path.as_deref(),
    )
}

/// Find the first candidate executable on the search path.
///
/// A non-empty override wins without being checked, matching how build
/// tools treat `CC`. Otherwise each candidate name is looked up in turn
/// across the whole search path.
#[must_use]
pub fn find_compiler(
    override_value: Option<&str>,
    candidates: &[&str],
    search_path: Option<&OsStr>,
) -> Option<Utf8PathBuf> {
    if let Some(value) = override_value.filter(|v| !v.trim().is_empty()) {
        return Some(Utf8PathBuf::from(value.trim()));
    }

    let search_path = search_path?;
    let cwd = std::env::current_dir().ok()?;
    candidates.iter().find_map(|name| {
        which::which_in(name, Some(search_path), &cwd)
            .ok()
            .and_then(|path| Utf8PathBuf::try_from(path).ok())
    })
}

/// Classify the Linux distribution from marker files under `root`.
///
/// `root` is `/` on a real host; tests point it at a scratch tree.
#[must_use]
pub fn discover_distro(root: &Utf8Path, os: OsFamily) -> DistroIdentity {
    if os != OsFamily::Linux {
        return DistroIdentity::NotLinux;
    }

    let etc = root.join("etc");
    if read_marker(&etc.join("lsb-release")).contains("Ubuntu") {
        return DistroIdentity::Ubuntu;
    }
    if etc.join("debian_version").exists() {
        return DistroIdentity::Debian;
    }

    let redhat_release = etc.join("redhat-release");
    if redhat_release.exists() {
        let contents = read_marker(&redhat_release);
        return if contents.contains("CentOS") {
            DistroIdentity::CentOs
        } else if contents.contains("Fedora") {
            DistroIdentity::Fedora
        } else {
            DistroIdentity::Rhel
        };
    }
    if etc.join("suse-release").exists() {
        return DistroIdentity::Suse;
    }
    if etc.join("gentoo-release").exists() {
        return DistroIdentity::Gentoo;
    }
    DistroIdentity::Unknown
}

fn read_marker(path: &Utf8Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// Query the machine architecture with `uname -m`.
///
/// Falls back to the architecture this binary was built for when the query
/// cannot be run.
#[must_use]
pub fn architecture_bits(executor: &dyn CommandExecutor) -> Architecture {
    let query = CommandSpec::new("uname").arg("-m").captured();
    match executor.run(&query) {
        Ok(output) if output.status.success() => {
            Architecture::from_machine(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!("uname -m exited with {}; using build architecture", output.status);
            Architecture::from_machine(std::env::consts::ARCH)
        }
        Err(err) => {
            debug!("uname -m unavailable ({err}); using build architecture");
            Architecture::from_machine(std::env::consts::ARCH)
        }
    }
}

/// Identify the user running the installer.
#[must_use]
pub fn current_invoker(executor: &dyn CommandExecutor) -> Invoker {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let privileged = unsafe { libc::geteuid() } == 0;
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| whoami(executor))
        .unwrap_or_else(|| "an unknown user".to_owned());
    Invoker { privileged, user }
}

fn whoami(executor: &dyn CommandExecutor) -> Option<String> {
    let output = executor
        .run(&CommandSpec::new("whoami").captured())
        .ok()
        .filter(|output| output.status.success())?;
    let name = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    (!name.is_empty()).then_some(name)
}

/// Detects host platform information.
#[derive(Debug, Clone)]
pub struct PlatformProbe {
    marker_root: Utf8PathBuf,
    os: OsFamily,
}

impl Default for PlatformProbe {
    fn default() -> Self {
        Self {
            marker_root: Utf8PathBuf::from("/"),
            os: OsFamily::current(),
        }
    }
}

impl PlatformProbe {
    /// Create a probe for the running host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read distribution marker files below `root` instead of `/`.
    #[must_use]
    pub fn with_marker_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.marker_root = root.into();
        self
    }

    /// Report the given OS family instead of the running one.
    #[must_use]
    pub fn with_os(mut self, os: OsFamily) -> Self {
        self.os = os;
        self
    }

    /// Run every detection once and return the result.
    #[must_use]
    pub fn detect(&self, executor: &dyn CommandExecutor) -> PlatformInfo {
        let info = PlatformInfo {
            os: self.os,
            distro: discover_distro(&self.marker_root, self.os),
            architecture: architecture_bits(executor),
            c_compiler: discover_compiler(CompilerKind::C),
            cxx_compiler: discover_compiler(CompilerKind::Cxx),
            invoker: current_invoker(executor),
        };
        trace!("detected platform: {info:?}");
        info
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
