//! Build dependency checks.
//!
//! This module declares the external software the distribution needs to
//! build (compilers and development headers) and checks it before anything
//! is compiled. Every dependency is checked, so the user sees all missing
//! software at once together with the most specific remediation known for
//! the host.

mod probe;

pub use probe::{
    Advice, Capability, Check, ProbeResult, ProbeState, Prober, Remediation, SCRATCH_STEM,
};

use crate::error::{InstallerError, Result};
use crate::platform::{CompilerKind, DistroIdentity, OsFamily, PlatformInfo};

const APPLE_TOOLS: &str =
    "Please install the Apple Development Tools: http://developer.apple.com/tools/";

/// A dependency that failed its check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Name of the dependency.
    pub name: String,
    /// The most specific remediation advice.
    pub advice: Advice,
}

/// The immutable registry of required capabilities.
#[derive(Debug)]
pub struct DependencyCatalog {
    capabilities: Vec<Capability>,
}

impl DependencyCatalog {
    /// Create a catalog from explicit capabilities.
    #[must_use]
    pub const fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }

    /// The dependencies needed to build the distribution on `platform`.
    ///
    /// Remediation text is fixed here from the detected OS and distribution.
    #[must_use]
    pub fn standard(platform: &PlatformInfo) -> Self {
        let os = platform.os;
        let distro = platform.distro;
        let compiler = |name: &str, kind: CompilerKind| {
            Capability::new(
                name,
                Check::Compiler(kind),
                Remediation {
                    install_command: package_command(
                        os,
                        distro,
                        "build-essential",
                        "gcc-c++",
                        Some("gcc"),
                    ),
                    instructions: (os == OsFamily::MacOs).then(|| APPLE_TOOLS.to_owned()),
                    website: Some("http://gcc.gnu.org/".to_owned()),
                },
            )
        };
        let headers =
            |name: &str, check: &'static [&'static str], apt: &str, yum: &str, site: &str| {
                Capability::new(
                    name,
                    Check::Headers(check),
                    Remediation {
                        install_command: package_command(os, distro, apt, yum, None),
                        instructions: None,
                        website: Some(site.to_owned()),
                    },
                )
            };

        Self::new(vec![
            compiler("C compiler", CompilerKind::C),
            compiler("C++ compiler", CompilerKind::Cxx),
            headers(
                "Zlib development headers",
                &["zlib.h"],
                "zlib1g-dev",
                "zlib-devel",
                "http://www.zlib.net/",
            ),
            headers(
                "OpenSSL development headers",
                &["openssl/ssl.h"],
                "libssl-dev",
                "openssl-devel",
                "http://www.openssl.org/",
            ),
            headers(
                "GNU Readline development headers",
                &["stdio.h", "readline/readline.h"],
                "libreadline5-dev",
                "readline-devel",
                "http://cnswww.cns.cwru.edu/php/chet/readline/rltop.html",
            ),
        ])
    }

    /// The declared capabilities, in declaration order.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Check every capability in declaration order.
    ///
    /// A failed check does not stop later checks.
    #[must_use]
    pub fn check_all(&self, prober: &Prober<'_>) -> DependencyReport {
        let missing = self
            .capabilities
            .iter()
            .filter(|capability| !capability.probe(prober).is_found())
            .map(|capability| MissingDependency {
                name: capability.name().to_owned(),
                advice: capability.remediation().advice(),
            })
            .collect();
        DependencyReport { missing }
    }
}

/// Result of checking a whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    missing: Vec<MissingDependency>,
}

impl DependencyReport {
    /// Dependencies that failed their check, in declaration order.
    #[must_use]
    pub fn missing(&self) -> &[MissingDependency] {
        &self.missing
    }

    /// Whether every dependency was found.
    #[must_use]
    pub fn all_found(&self) -> bool {
        self.missing.is_empty()
    }

    /// Convert the report into an error if anything is missing.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::MissingDependencies`] listing every missing
    /// dependency.
    pub fn into_result(self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(InstallerError::MissingDependencies {
                missing: self.missing,
            })
        }
    }
}

fn package_command(
    os: OsFamily,
    distro: DistroIdentity,
    apt: &str,
    yum: &str,
    emerge: Option<&str>,
) -> Option<String> {
    if os != OsFamily::Linux {
        return None;
    }
    if distro.is_debian_family() {
        Some(format!("apt-get install {apt}"))
    } else if distro.is_redhat_family() {
        Some(format!("yum install {yum}"))
    } else if distro == DistroIdentity::Gentoo {
        emerge.map(|package| format!("emerge -av {package}"))
    } else {
        None
    }
}
