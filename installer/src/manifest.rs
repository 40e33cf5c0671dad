//! Distribution manifest parsing.
//!
//! A distribution describes itself in `distribution.toml` at its root:
//!
//! ```toml
//! [distribution]
//! name = "Ruby Enterprise Edition"
//! version = "1.8.6-20080317"
//! default_prefix = "/opt/ruby-enterprise-{version}"
//!
//! [components.core]
//! dir = "source"
//!
//! [packages]
//! extra = ["rails", "mongrel"]
//! ```
//!
//! Every section except `[distribution]` is optional. Older distributions
//! ship only `version.txt`; those load with built-in defaults.

use crate::error::{InstallerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;

/// File name of the distribution manifest.
pub const MANIFEST_FILE: &str = "distribution.toml";

/// File name of the legacy version marker.
pub const VERSION_FILE: &str = "version.txt";

const DEFAULT_NAME: &str = "Ruby Enterprise Edition";
const DEFAULT_RUNTIME: &str = "ruby";
const DEFAULT_PREFIX_TEMPLATE: &str = "/opt/ruby-enterprise-{version}";

/// Description of a source distribution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionManifest {
    /// Identity of the distribution.
    pub distribution: DistributionInfo,
    /// Where each buildable component lives.
    #[serde(default)]
    pub components: Components,
    /// Packages and extensions handled after the runtime is installed.
    #[serde(default)]
    pub packages: Packages,
}

/// The `[distribution]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionInfo {
    /// Display name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Version string, substituted for `{version}` in the prefix template.
    pub version: String,
    /// Name of the runtime executable installed under `bin/`.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Default installation prefix template.
    #[serde(default = "default_prefix_template")]
    pub default_prefix: String,
}

/// The `[components]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Components {
    /// The runtime itself.
    pub core: ComponentSource,
    /// The replacement memory allocator.
    pub allocator: ComponentSource,
    /// The stack-unwinding library the allocator needs on some hosts.
    pub unwind: ComponentSource,
    /// Directory of the bundled package manager.
    pub package_manager: Utf8PathBuf,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            core: ComponentSource::new("source"),
            allocator: ComponentSource {
                dir: Utf8PathBuf::from("source/vendor/google-perftools-1.2"),
                configure_options: vec!["--disable-dependency-tracking".to_owned()],
            },
            unwind: ComponentSource::new("source/vendor/libunwind-0.98.6"),
            package_manager: Utf8PathBuf::from("rubygems"),
        }
    }
}

/// A component built with `configure` and `make`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSource {
    /// Build tree, relative to the distribution root.
    pub dir: Utf8PathBuf,
    /// Extra arguments passed to `configure` after `--prefix`.
    #[serde(default)]
    pub configure_options: Vec<String>,
}

impl ComponentSource {
    fn new(dir: &str) -> Self {
        Self {
            dir: Utf8PathBuf::from(dir),
            configure_options: Vec::new(),
        }
    }
}

/// The `[packages]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Packages {
    /// Packages installed when the extra-package set is requested.
    pub extra: Vec<String>,
    /// Options passed to every package install.
    pub install_options: Vec<String>,
    /// Bundled extension directories rebuilt against the new runtime,
    /// relative to the distribution root.
    pub extensions: Vec<Utf8PathBuf>,
}

impl Default for Packages {
    fn default() -> Self {
        Self {
            extra: ["rails", "mongrel", "fastthread", "mysql", "sqlite3-ruby", "postgres"]
                .map(str::to_owned)
                .to_vec(),
            install_options: ["--no-rdoc", "--no-ri", "--backtrace"]
                .map(str::to_owned)
                .to_vec(),
            extensions: Vec::new(),
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_owned()
}

fn default_runtime() -> String {
    DEFAULT_RUNTIME.to_owned()
}

fn default_prefix_template() -> String {
    DEFAULT_PREFIX_TEMPLATE.to_owned()
}

impl DistributionManifest {
    /// Load the manifest of the distribution rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::DistributionNotFound`] when neither
    /// `distribution.toml` nor `version.txt` exists, and
    /// [`InstallerError::InvalidManifest`] when the manifest cannot be parsed.
    pub fn load(root: &Utf8Path) -> Result<Self> {
        let manifest_path = root.join(MANIFEST_FILE);
        if manifest_path.is_file() {
            let contents = std::fs::read_to_string(&manifest_path)?;
            return Self::parse(&contents, &manifest_path);
        }

        let version_path = root.join(VERSION_FILE);
        if version_path.is_file() {
            debug!("{MANIFEST_FILE} not found; using built-in layout");
            let version = std::fs::read_to_string(&version_path)?;
            return Ok(Self::builtin(version.trim()));
        }

        Err(InstallerError::DistributionNotFound {
            path: root.to_owned(),
        })
    }

    /// Parse manifest text read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidManifest`] on malformed TOML, unknown
    /// keys or an empty version.
    pub fn parse(contents: &str, path: &Utf8Path) -> Result<Self> {
        let manifest: Self =
            toml::from_str(contents).map_err(|err| InstallerError::InvalidManifest {
                path: path.to_owned(),
                reason: err.to_string(),
            })?;
        if manifest.distribution.version.trim().is_empty() {
            return Err(InstallerError::InvalidManifest {
                path: path.to_owned(),
                reason: "distribution.version must not be empty".to_owned(),
            });
        }
        Ok(manifest)
    }

    /// A manifest with the built-in layout and the given version.
    #[must_use]
    pub fn builtin(version: impl Into<String>) -> Self {
        Self {
            distribution: DistributionInfo {
                name: default_name(),
                version: version.into(),
                runtime: default_runtime(),
                default_prefix: default_prefix_template(),
            },
            components: Components::default(),
            packages: Packages::default(),
        }
    }

    /// Display name of the distribution.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.distribution.name
    }

    /// Version of the distribution.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.distribution.version
    }

    /// Name of the runtime executable.
    #[must_use]
    pub fn runtime(&self) -> &str {
        &self.distribution.runtime
    }

    /// The default installation prefix, with the version substituted.
    ///
    /// # Examples
    ///
    /// ```
    /// use ree_installer::manifest::DistributionManifest;
    ///
    /// let manifest = DistributionManifest::builtin("1.8.6-20080317");
    /// assert_eq!(manifest.default_prefix(), "/opt/ruby-enterprise-1.8.6-20080317");
    /// ```
    #[must_use]
    pub fn default_prefix(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.distribution
                .default_prefix
                .replace("{version}", self.version()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn dist_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir not UTF-8");
        (dir, root)
    }

    #[test]
    fn minimal_manifest_takes_defaults() {
        let manifest = DistributionManifest::parse(
            "[distribution]\nversion = \"1.8.7\"\n",
            Utf8Path::new(MANIFEST_FILE),
        )
        .expect("minimal manifest should parse");

        assert_eq!(manifest.name(), "Ruby Enterprise Edition");
        assert_eq!(manifest.runtime(), "ruby");
        assert_eq!(manifest.components, Components::default());
        assert_eq!(manifest.default_prefix(), "/opt/ruby-enterprise-1.8.7");
    }

    #[test]
    fn full_manifest_overrides_layout() {
        let manifest = DistributionManifest::parse(
            r#"
                [distribution]
                name = "Custom Ruby"
                version = "2.0"
                runtime = "ruby2"
                default_prefix = "/usr/local/custom-{version}"

                [components]
                package_manager = "gems"

                [components.core]
                dir = "src"
                configure_options = ["--enable-shared"]

                [packages]
                extra = ["rack"]
                extensions = ["ext/fastthread"]
            "#,
            Utf8Path::new(MANIFEST_FILE),
        )
        .expect("manifest should parse");

        assert_eq!(manifest.runtime(), "ruby2");
        assert_eq!(manifest.default_prefix(), "/usr/local/custom-2.0");
        assert_eq!(manifest.components.core.dir, "src");
        assert_eq!(manifest.components.core.configure_options, ["--enable-shared"]);
        assert_eq!(manifest.components.package_manager, "gems");
        assert_eq!(manifest.components.allocator, Components::default().allocator);
        assert_eq!(manifest.packages.extra, ["rack"]);
        assert_eq!(manifest.packages.install_options, Packages::default().install_options);
        assert_eq!(manifest.packages.extensions, [Utf8PathBuf::from("ext/fastthread")]);
    }

    #[rstest]
    #[case::missing_version("[distribution]\nname = \"x\"\n")]
    #[case::empty_version("[distribution]\nversion = \"  \"\n")]
    #[case::unknown_key("[distribution]\nversion = \"1\"\ncolour = \"red\"\n")]
    #[case::not_toml("distribution = [")]
    fn invalid_manifests_are_rejected(#[case] contents: &str) {
        let err = DistributionManifest::parse(contents, Utf8Path::new("dist/distribution.toml"))
            .expect_err("manifest should be rejected");
        assert!(matches!(err, InstallerError::InvalidManifest { .. }));
        assert!(err.to_string().contains("dist/distribution.toml"));
    }

    #[rstest]
    fn load_prefers_manifest(dist_root: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = dist_root;
        std::fs::write(root.join(VERSION_FILE), "0.1").expect("write version");
        std::fs::write(
            root.join(MANIFEST_FILE),
            "[distribution]\nversion = \"0.2\"\n",
        )
        .expect("write manifest");

        let manifest = DistributionManifest::load(&root).expect("load should succeed");
        assert_eq!(manifest.version(), "0.2");
    }

    #[rstest]
    fn load_falls_back_to_version_file(dist_root: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = dist_root;
        std::fs::write(root.join(VERSION_FILE), "1.8.6-20080317\n").expect("write version");

        let manifest = DistributionManifest::load(&root).expect("load should succeed");
        assert_eq!(manifest, DistributionManifest::builtin("1.8.6-20080317"));
    }

    #[rstest]
    fn load_without_markers_is_not_found(dist_root: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = dist_root;
        let err = DistributionManifest::load(&root).expect_err("load should fail");
        assert!(matches!(err, InstallerError::DistributionNotFound { .. }));
    }

    #[test]
    fn builtin_layout_matches_bundled_tree() {
        let manifest = DistributionManifest::builtin("1.0");
        assert_eq!(manifest.components.core.dir, "source");
        assert_eq!(
            manifest.components.allocator.configure_options,
            ["--disable-dependency-tracking"]
        );
        assert_eq!(manifest.components.package_manager, "rubygems");
        assert!(manifest.packages.extensions.is_empty());
        assert_eq!(manifest.packages.extra.len(), 6);
    }
}
