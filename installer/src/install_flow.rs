//! The installation session.
//!
//! [`InstallFlow`] walks a distribution from the welcome screen to the final
//! screen: platform detection, dependency checks, prefix selection, planning,
//! execution and post-install fixups. Prompts read from and screens write to
//! injected streams, and every external program goes through the injected
//! [`CommandExecutor`].

use crate::cli::Cli;
use crate::context::InstallationContext;
use crate::deps::{DependencyCatalog, Prober};
use crate::error::{InstallerError, Result};
use crate::exec::CommandExecutor;
use crate::executor::{ExecutionReport, StepExecutor};
use crate::fixup::{FixupReport, apply_fixups};
use crate::manifest::DistributionManifest;
use crate::output;
use crate::plan::plan_steps;
use crate::platform::{PlatformInfo, PlatformProbe};
use crate::prefix::{PrefixMarker, query_prefix, validate_prefix, wait_for_enter};
use camino::Utf8PathBuf;
use log::{debug, info};
use std::io::{BufRead, Write};

/// Result of a completed installation.
#[derive(Debug)]
pub struct InstallOutcome {
    /// The prefix the distribution was installed to.
    pub prefix: Utf8PathBuf,
    /// Per-step results, including soft failures.
    pub report: ExecutionReport,
    /// Results of the post-install fixups.
    pub fixups: FixupReport,
}

/// One installer session.
pub struct InstallFlow<'a> {
    cli: &'a Cli,
    commands: &'a dyn CommandExecutor,
    probe: PlatformProbe,
    platform: Option<PlatformInfo>,
    scratch_dir: Option<Utf8PathBuf>,
}

impl<'a> InstallFlow<'a> {
    /// Create a session driven by `cli` that runs programs with `commands`.
    #[must_use]
    pub fn new(cli: &'a Cli, commands: &'a dyn CommandExecutor) -> Self {
        Self {
            cli,
            commands,
            probe: PlatformProbe::new(),
            platform: None,
            scratch_dir: None,
        }
    }

    /// Use `platform` instead of detecting the host.
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Write dependency compile tests into `dir`.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Run the session to completion.
    ///
    /// Screens for the user are written to `out`; any failure screen is
    /// written before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::MissingDependencies`] when the host cannot
    /// build the distribution, [`InstallerError::UserAbort`] when a prompt is
    /// abandoned, and the first step failure otherwise.
    pub fn run(&self, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<InstallOutcome> {
        let dist_root = &self.cli.dist_dir;
        let manifest = DistributionManifest::load(dist_root)?;
        let marker = PrefixMarker::new(&dist_root.join(&manifest.components.core.dir));
        let mut context = InstallationContext::new(
            dist_root.clone(),
            manifest.default_prefix(),
            marker.read(),
            self.cli.install_options(),
        );

        output::welcome_screen(out, manifest.name(), manifest.version());
        if !self.cli.is_non_interactive() {
            wait_for_enter(input)?;
        }

        let platform = self.detect_platform();
        context.apply_platform(&platform);
        self.check_dependencies(&platform, out)?;

        let prefix = self.select_prefix(&manifest, &context, input, out)?;
        info!("installing to {prefix}");
        context.select_prefix(prefix.clone());
        marker.write(&prefix)?;

        let report = self.build(&context, &manifest, &platform, out)?;

        let fixups = apply_fixups(&context, manifest.runtime());
        output::soft_failure_summary(out, report.soft_failures());
        output::fixup_failure_summary(out, &fixups.failures);
        output::finalization_screen(out, manifest.name(), &prefix, manifest.runtime());

        Ok(InstallOutcome {
            prefix,
            report,
            fixups,
        })
    }

    fn detect_platform(&self) -> PlatformInfo {
        match &self.platform {
            Some(platform) => platform.clone(),
            None => self.probe.detect(self.commands),
        }
    }

    fn check_dependencies(&self, platform: &PlatformInfo, out: &mut dyn Write) -> Result<()> {
        let catalog = DependencyCatalog::standard(platform);
        let mut prober = Prober::new(platform, self.commands);
        if let Some(dir) = &self.scratch_dir {
            prober = prober.with_scratch_dir(dir.clone());
        }
        let report = catalog.check_all(&prober);
        if !report.all_found() {
            output::missing_dependencies_screen(out, report.missing());
        }
        report.into_result()
    }

    fn select_prefix(
        &self,
        manifest: &DistributionManifest,
        context: &InstallationContext,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<Utf8PathBuf> {
        match &self.cli.auto {
            Some(prefix) => validate_prefix(prefix),
            None => {
                output::target_directory_screen(out, manifest.name());
                query_prefix(input, out, context.prefix())
            }
        }
    }

    fn build(
        &self,
        context: &InstallationContext,
        manifest: &DistributionManifest,
        platform: &PlatformInfo,
        out: &mut dyn Write,
    ) -> Result<ExecutionReport> {
        let steps = plan_steps(context, manifest);
        debug!(
            "planned steps: {}",
            steps
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        output::build_screen(out, manifest.name());
        let mut report = ExecutionReport::new(steps);
        let executor = StepExecutor::new(context, manifest, platform, self.commands);
        match executor.run(&mut report) {
            Ok(()) => Ok(report),
            Err(err) => {
                if let InstallerError::InstallPermission {
                    prefix, privilege, ..
                } = &err
                {
                    output::permission_failure_screen(out, manifest.name(), prefix, privilege);
                }
                Err(err)
            }
        }
    }
}
