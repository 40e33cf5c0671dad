//! Sequential step execution.
//!
//! [`StepExecutor::run`] walks an [`ExecutionReport`] in order. Each step
//! moves Pending → Running → Succeeded or Failed; the first failure stops
//! the run and leaves every later step Pending. Nothing is rolled back.

use crate::context::InstallationContext;
use crate::error::{InstallerError, Result};
use crate::exec::{CommandExecutor, CommandSpec, failure_reason};
use crate::manifest::{ComponentSource, DistributionManifest};
use crate::plan::{Component, Step, allocator_active};
use crate::platform::PlatformInfo;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::fs::File;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Library the runtime links against when the allocator is active.
pub const ALLOCATOR_LIBRARY: &str = "tcmalloc_minimal";

/// Source of the allocator interposer, relative to the core build tree.
pub const INTERPOSER_SOURCE: &str = "system_allocator.c";

/// Base name of the allocator interposer library.
pub const INTERPOSER_LIBRARY: &str = "libsystem_allocator";

/// Executable name of the bundled package manager under `bin`.
pub const PACKAGE_MANAGER_EXECUTABLE: &str = "gem";

/// How far in the past build-tree timestamps are moved.
pub const TIMESTAMP_OFFSET: Duration = Duration::from_secs(60 * 60);

/// Execution state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Not started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully, or already satisfied.
    Succeeded,
    /// Finished unsuccessfully.
    Failed,
}

impl StepState {
    /// Lowercase state name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether `self` may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

/// Progress of one planned step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    step: Step,
    state: StepState,
    skipped: bool,
}

impl StepRecord {
    /// A pending record for `step`.
    #[must_use]
    pub const fn new(step: Step) -> Self {
        Self {
            step,
            state: StepState::Pending,
            skipped: false,
        }
    }

    /// The step.
    #[must_use]
    pub const fn step(&self) -> &Step {
        &self.step
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StepState {
        self.state
    }

    /// Whether the step succeeded without doing work because its result
    /// was already present.
    #[must_use]
    pub const fn skipped(&self) -> bool {
        self.skipped
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidTransition`] for any move other than
    /// Pending → Running or Running → Succeeded/Failed.
    pub fn transition(&mut self, next: StepState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(InstallerError::InvalidTransition {
                step: self.step.clone(),
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }
}

/// A package that failed to install without failing the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    /// The package name.
    pub package: String,
    /// Command the user can run to retry.
    pub command: String,
}

/// Per-step outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    records: Vec<StepRecord>,
    soft_failures: Vec<SoftFailure>,
}

impl ExecutionReport {
    /// A report with every step pending.
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            records: steps.into_iter().map(StepRecord::new).collect(),
            soft_failures: Vec::new(),
        }
    }

    /// Records in plan order.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Soft failures collected so far.
    #[must_use]
    pub fn soft_failures(&self) -> &[SoftFailure] {
        &self.soft_failures
    }

    /// The record for `step`, if planned.
    #[must_use]
    pub fn record(&self, step: &Step) -> Option<&StepRecord> {
        self.records.iter().find(|record| &record.step == step)
    }

    /// Whether every step succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.records
            .iter()
            .all(|record| record.state == StepState::Succeeded)
    }

    fn transition(&mut self, index: usize, next: StepState) -> Result<()> {
        match self.records.get_mut(index) {
            Some(record) => record.transition(next),
            None => Ok(()),
        }
    }

    fn mark_skipped(&mut self, index: usize) {
        if let Some(record) = self.records.get_mut(index) {
            record.skipped = true;
        }
    }
}

enum StepOutcome {
    Completed,
    AlreadySatisfied,
    CompletedWithWarnings(Vec<SoftFailure>),
}

/// Runs planned steps against the host.
pub struct StepExecutor<'a> {
    context: &'a InstallationContext,
    manifest: &'a DistributionManifest,
    platform: &'a PlatformInfo,
    commands: &'a dyn CommandExecutor,
    env: Vec<(String, String)>,
}

impl<'a> StepExecutor<'a> {
    /// Create an executor. The child environment is fixed from `context`
    /// here.
    #[must_use]
    pub fn new(
        context: &'a InstallationContext,
        manifest: &'a DistributionManifest,
        platform: &'a PlatformInfo,
        commands: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            context,
            manifest,
            platform,
            commands,
            env: context.child_env(),
        }
    }

    /// Run every pending step of `report` in order.
    ///
    /// # Errors
    ///
    /// Returns the first step failure. The failing step is left Failed and
    /// later steps Pending.
    pub fn run(&self, report: &mut ExecutionReport) -> Result<()> {
        let steps: Vec<Step> = report.records.iter().map(|r| r.step.clone()).collect();
        for (index, step) in steps.iter().enumerate() {
            report.transition(index, StepState::Running)?;
            info!("{step}: started");

            match self.execute(step) {
                Ok(outcome) => {
                    match outcome {
                        StepOutcome::Completed => info!("{step}: finished"),
                        StepOutcome::AlreadySatisfied => {
                            info!("{step}: already satisfied, skipped");
                            report.mark_skipped(index);
                        }
                        StepOutcome::CompletedWithWarnings(failures) => {
                            info!("{step}: finished with {} warning(s)", failures.len());
                            report.soft_failures.extend(failures);
                        }
                    }
                    report.transition(index, StepState::Succeeded)?;
                }
                Err(err) => {
                    info!("{step}: failed");
                    report.transition(index, StepState::Failed)?;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn execute(&self, step: &Step) -> Result<StepOutcome> {
        match step {
            Step::Configure(component) => self.configure(step, *component),
            Step::Compile(component) => self.compile(step, *component),
            Step::Install(component) => self.install(step, *component),
            Step::AllocatorInterposer => self.compile_interposer(step),
            Step::PackageManagerInstall => self.install_package_manager(step),
            Step::InstallPackages(packages) => Ok(self.install_packages(packages)),
            Step::RebuildExtensions(dirs) => self.rebuild_extensions(step, dirs),
        }
    }

    fn configure(&self, step: &Step, component: Component) -> Result<StepOutcome> {
        let source = self.source(component);
        let dir = self.context.dist_root().join(&source.dir);

        if !has_object_files(&dir) {
            let instant = SystemTime::now()
                .checked_sub(TIMESTAMP_OFFSET)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            normalize_timestamps(&dir, instant);
        }

        let outcome = if component == Component::Core && self.core_configured(&dir) {
            StepOutcome::AlreadySatisfied
        } else {
            let command = self
                .command("./configure", &dir)
                .arg(format!("--prefix={}", self.context.prefix()))
                .args(source.configure_options.iter().cloned());
            self.run_checked(step, &command)?;
            StepOutcome::Completed
        };

        if component == Component::Core && allocator_active(self.context) {
            self.link_allocator(step, &dir)?;
        }
        Ok(outcome)
    }

    /// Whether the core tree is configured for this prefix and allocator
    /// choice.
    fn core_configured(&self, dir: &Utf8Path) -> bool {
        if !self.context.prefix_unchanged() {
            return false;
        }
        match std::fs::read_to_string(dir.join("Makefile")) {
            Ok(makefile) => allocator_active(self.context) || !links_allocator(&makefile),
            Err(_) => false,
        }
    }

    fn link_allocator(&self, step: &Step, dir: &Utf8Path) -> Result<()> {
        let makefile = dir.join("Makefile");
        let contents = std::fs::read_to_string(&makefile)?;
        let flags = format!(
            "-Wl,-rpath,{} -L{} -l{ALLOCATOR_LIBRARY}",
            self.context.prefix().join("lib"),
            self.context.installed_lib_dir(),
        );
        match patch_libs_line(&contents, &flags) {
            LibsPatch::Patched(patched) => {
                debug!("linking {ALLOCATOR_LIBRARY} through {makefile}");
                std::fs::write(&makefile, patched)?;
                Ok(())
            }
            LibsPatch::AlreadyLinked => Ok(()),
            LibsPatch::NoLibsLine => Err(InstallerError::StepFailed {
                step: step.clone(),
                reason: format!("{makefile} has no LIBS line to link {ALLOCATOR_LIBRARY}"),
            }),
        }
    }

    fn compile(&self, step: &Step, component: Component) -> Result<StepOutcome> {
        let dir = self.component_dir(component);
        if component == Component::Core {
            std::fs::create_dir_all(dir.join(".ext").join("common"))?;
        }
        self.run_checked(step, &self.command("make", &dir))?;
        Ok(StepOutcome::Completed)
    }

    fn install(&self, step: &Step, component: Component) -> Result<StepOutcome> {
        let dir = self.component_dir(component);
        let command = self.with_destdir(self.command("make", &dir).arg("install"));
        self.run_install(step, &command)?;
        Ok(StepOutcome::Completed)
    }

    fn compile_interposer(&self, step: &Step) -> Result<StepOutcome> {
        let dir = self.component_dir(Component::Core);
        let lib_dir = self.context.installed_lib_dir();
        std::fs::create_dir_all(&lib_dir)?;
        let library = format!(
            "{INTERPOSER_LIBRARY}.{}",
            self.platform.library_extension()
        );
        let command = self
            .command(self.platform.c_compiler_command(), &dir)
            .arg("-dynamiclib")
            .arg(INTERPOSER_SOURCE)
            .arg("-install_name")
            .arg(format!("@rpath/{library}"))
            .arg("-o")
            .arg(lib_dir.join(&library).into_string());
        self.run_checked(step, &command)?;
        Ok(StepOutcome::Completed)
    }

    fn install_package_manager(&self, step: &Step) -> Result<StepOutcome> {
        let dir = self
            .context
            .dist_root()
            .join(&self.manifest.components.package_manager);
        let command = self
            .command(self.runtime().into_string(), &dir)
            .args(["setup.rb", "--no-ri", "--no-rdoc"]);
        self.run_install(step, &self.with_destdir(command))?;
        Ok(StepOutcome::Completed)
    }

    fn install_packages(&self, packages: &[String]) -> StepOutcome {
        let package_manager = self
            .context
            .installed_executable(PACKAGE_MANAGER_EXECUTABLE)
            .into_string();
        let options = &self.manifest.packages.install_options;

        let failures: Vec<SoftFailure> = packages
            .iter()
            .filter_map(|package| {
                let command = self
                    .command(self.runtime().into_string(), self.context.dist_root())
                    .arg(package_manager.clone())
                    .arg("install")
                    .args(options.iter().cloned())
                    .arg(package.clone());
                let installed = match self.commands.run(&command) {
                    Ok(output) => output.status.success(),
                    Err(err) => {
                        debug!("{err}");
                        false
                    }
                };
                if installed {
                    return None;
                }
                let retry = self.retry_command(options, package);
                warn!("package {package} failed to install; retry with `{retry}`");
                Some(SoftFailure {
                    package: package.clone(),
                    command: retry,
                })
            })
            .collect();

        if failures.is_empty() {
            StepOutcome::Completed
        } else {
            StepOutcome::CompletedWithWarnings(failures)
        }
    }

    fn rebuild_extensions(&self, step: &Step, dirs: &[Utf8PathBuf]) -> Result<StepOutcome> {
        for relative in dirs {
            let dir = self.context.dist_root().join(relative);
            let runtime = self.runtime().into_string();
            self.run_checked(step, &self.command(runtime, &dir).arg("extconf.rb"))?;
            self.run_checked(step, &self.command("make", &dir))?;
            let install = self.with_destdir(self.command("make", &dir).arg("install"));
            self.run_checked(step, &install)?;
        }
        Ok(StepOutcome::Completed)
    }

    fn source(&self, component: Component) -> &ComponentSource {
        let components = &self.manifest.components;
        match component {
            Component::Unwind => &components.unwind,
            Component::Allocator => &components.allocator,
            Component::Core => &components.core,
        }
    }

    fn component_dir(&self, component: Component) -> Utf8PathBuf {
        self.context.dist_root().join(&self.source(component).dir)
    }

    fn runtime(&self) -> Utf8PathBuf {
        self.context.installed_executable(self.manifest.runtime())
    }

    fn retry_command(&self, options: &[String], package: &str) -> String {
        let bin = self.context.prefix().join("bin");
        let mut words = vec![
            bin.join(self.manifest.runtime()).into_string(),
            bin.join(PACKAGE_MANAGER_EXECUTABLE).into_string(),
            "install".to_owned(),
        ];
        words.extend(options.iter().cloned());
        words.push(package.to_owned());
        words.join(" ")
    }

    fn command(&self, program: impl Into<String>, dir: &Utf8Path) -> CommandSpec {
        CommandSpec::new(program)
            .current_dir(dir.to_owned())
            .envs(&self.env)
    }

    fn with_destdir(&self, command: CommandSpec) -> CommandSpec {
        match self.context.staging_root() {
            Some(root) => command.env("DESTDIR", root.as_str()),
            None => command,
        }
    }

    fn run_checked(&self, step: &Step, command: &CommandSpec) -> Result<()> {
        let output = self.commands.run(command)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(InstallerError::StepFailed {
                step: step.clone(),
                reason: failure_reason(command, &output),
            })
        }
    }

    fn run_install(&self, step: &Step, command: &CommandSpec) -> Result<()> {
        let output = self.commands.run(command)?;
        if output.status.success() {
            return Ok(());
        }
        debug!("{}", failure_reason(command, &output));
        Err(InstallerError::InstallPermission {
            step: step.clone(),
            prefix: self.context.prefix().to_owned(),
            privilege: self.platform.invoker.privilege(),
        })
    }
}

/// Result of patching a Makefile's `LIBS` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibsPatch {
    /// The patched Makefile text.
    Patched(String),
    /// The `LIBS` line already names the allocator library.
    AlreadyLinked,
    /// The Makefile has no `LIBS = ` line.
    NoLibsLine,
}

const LIBS_MARKER: &str = "LIBS = ";

/// Whether the first `LIBS = ` line of `makefile` links the allocator.
///
/// # Examples
///
/// ```
/// use ree_installer::executor::links_allocator;
///
/// assert!(links_allocator("CC = gcc\nLIBS = -ltcmalloc_minimal -lm\n"));
/// assert!(!links_allocator("LIBS = -lm\n"));
/// assert!(!links_allocator("CC = gcc\n"));
/// ```
#[must_use]
pub fn links_allocator(makefile: &str) -> bool {
    makefile
        .lines()
        .find_map(|line| line.strip_prefix(LIBS_MARKER))
        .is_some_and(names_allocator)
}

fn names_allocator(libs: &str) -> bool {
    libs.split_whitespace()
        .any(|flag| flag.strip_prefix("-l") == Some(ALLOCATOR_LIBRARY))
}

/// Prepend `flags` to the first `LIBS = ` line of `makefile`.
///
/// # Examples
///
/// ```
/// use ree_installer::executor::{LibsPatch, patch_libs_line};
///
/// let flags = "-L/stage/lib -ltcmalloc_minimal";
/// let LibsPatch::Patched(patched) = patch_libs_line("LIBS = -lm\n", flags) else {
///     panic!("expected a patch");
/// };
/// assert_eq!(patched, "LIBS = -L/stage/lib -ltcmalloc_minimal -lm\n");
/// assert_eq!(patch_libs_line(&patched, flags), LibsPatch::AlreadyLinked);
/// ```
#[must_use]
pub fn patch_libs_line(makefile: &str, flags: &str) -> LibsPatch {
    let mut patched = String::with_capacity(makefile.len() + flags.len() + 1);
    let mut found = false;

    for line in makefile.split_inclusive('\n') {
        match line.strip_prefix(LIBS_MARKER) {
            Some(rest) if !found => {
                if names_allocator(rest) {
                    return LibsPatch::AlreadyLinked;
                }
                found = true;
                patched.push_str(LIBS_MARKER);
                patched.push_str(flags);
                if !rest.trim().is_empty() {
                    patched.push(' ');
                }
                patched.push_str(rest);
            }
            _ => patched.push_str(line),
        }
    }

    if found {
        LibsPatch::Patched(patched)
    } else {
        LibsPatch::NoLibsLine
    }
}

/// Whether `dir` directly contains compiled object files.
#[must_use]
pub fn has_object_files(dir: &Utf8Path) -> bool {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .any(|entry| {
            entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "o")
        })
}

/// Set the modification time of every file below `dir` to `instant`.
///
/// Failures are logged per file and do not stop the walk.
pub fn normalize_timestamps(dir: &Utf8Path, instant: SystemTime) {
    let mut updated = 0;
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("cannot reset timestamps below {dir}: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match File::open(entry.path()).and_then(|file| file.set_modified(instant)) {
            Ok(()) => updated += 1,
            Err(err) => warn!("cannot reset timestamp of {}: {err}", entry.path().display()),
        }
    }
    debug!("reset timestamps of {updated} file(s) below {dir}");
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
