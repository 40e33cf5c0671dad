//! Build step planning.
//!
//! [`plan_steps`] turns the installation context into the ordered list of
//! steps the executor runs. The plan is a pure function of the context and
//! the manifest; it performs no I/O.

use crate::context::InstallationContext;
use crate::manifest::DistributionManifest;
use crate::platform::OsFamily;
use camino::Utf8PathBuf;
use std::fmt;

/// 64-bit machines the allocator is known to work on without help.
pub const ALLOCATOR_64BIT_MACHINES: &[&str] = &["x86_64", "amd64"];

/// 64-bit machines where the allocator needs the stack-unwinding library.
pub const UNWIND_64BIT_MACHINES: &[&str] = &["ia64"];

/// A component built with `configure` and `make`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// The stack-unwinding library.
    Unwind,
    /// The replacement memory allocator.
    Allocator,
    /// The runtime.
    Core,
}

impl Component {
    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unwind => "unwind",
            Self::Allocator => "allocator",
            Self::Core => "core",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of work in the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Run `configure` for a component.
    Configure(Component),
    /// Run `make` for a component.
    Compile(Component),
    /// Run `make install` for a component.
    Install(Component),
    /// Build the shim that routes system allocations through the
    /// replacement allocator.
    AllocatorInterposer,
    /// Install the bundled package manager.
    PackageManagerInstall,
    /// Install the listed packages, one at a time.
    InstallPackages(Vec<String>),
    /// Rebuild the listed bundled extension directories.
    RebuildExtensions(Vec<Utf8PathBuf>),
}

impl Step {
    /// The configure, compile and install steps of `component`, in order.
    #[must_use]
    pub const fn triple(component: Component) -> [Self; 3] {
        [
            Self::Configure(component),
            Self::Compile(component),
            Self::Install(component),
        ]
    }

    /// Whether the step installs files into the prefix.
    #[must_use]
    pub const fn is_install(&self) -> bool {
        matches!(self, Self::Install(_) | Self::PackageManagerInstall)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure(component) => write!(f, "{component}-configure"),
            Self::Compile(component) => write!(f, "{component}-compile"),
            Self::Install(component) => write!(f, "{component}-install"),
            Self::AllocatorInterposer => f.write_str("interposer-compile"),
            Self::PackageManagerInstall => f.write_str("packagemgr-install"),
            Self::InstallPackages(_) => f.write_str("packages-install"),
            Self::RebuildExtensions(_) => f.write_str("extensions-rebuild"),
        }
    }
}

/// Whether the replacement allocator is built for this context.
///
/// # Examples
///
/// ```
/// use ree_installer::plan::allocator_supported;
/// use ree_installer::platform::OsFamily;
///
/// assert!(allocator_supported(OsFamily::Linux, "i686", false));
/// assert!(allocator_supported(OsFamily::Linux, "x86_64", true));
/// assert!(!allocator_supported(OsFamily::Linux, "ppc64", true));
/// assert!(!allocator_supported(OsFamily::Solaris, "i686", false));
/// ```
#[must_use]
pub fn allocator_supported(os: OsFamily, machine: &str, is_64bit: bool) -> bool {
    let excluded = matches!(os, OsFamily::Solaris | OsFamily::Other);
    let machine_ok = !is_64bit
        || ALLOCATOR_64BIT_MACHINES.contains(&machine)
        || UNWIND_64BIT_MACHINES.contains(&machine);
    !excluded && machine_ok
}

/// Whether the allocator path is active for `context`.
#[must_use]
pub fn allocator_active(context: &InstallationContext) -> bool {
    !context.allocator_opt_out()
        && allocator_supported(context.os(), context.machine(), context.is_64bit())
}

/// Whether the allocator needs the stack-unwinding library on `context`.
#[must_use]
pub fn needs_unwind(context: &InstallationContext) -> bool {
    allocator_active(context) && UNWIND_64BIT_MACHINES.contains(&context.machine())
}

/// Assemble the ordered step list for `context`.
#[must_use]
pub fn plan_steps(context: &InstallationContext, manifest: &DistributionManifest) -> Vec<Step> {
    let mut steps = Vec::new();

    if allocator_active(context) {
        if needs_unwind(context) {
            steps.extend(Step::triple(Component::Unwind));
        }
        steps.extend(Step::triple(Component::Allocator));
        if context.os().uses_two_level_namespace() {
            steps.push(Step::AllocatorInterposer);
        }
    }

    steps.extend(Step::triple(Component::Core));
    steps.push(Step::PackageManagerInstall);

    if context.extra_packages() && !manifest.packages.extra.is_empty() {
        steps.push(Step::InstallPackages(manifest.packages.extra.clone()));
    }
    if !manifest.packages.extensions.is_empty() {
        steps.push(Step::RebuildExtensions(manifest.packages.extensions.clone()));
    }
    steps
}
