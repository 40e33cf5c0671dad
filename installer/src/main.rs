//! Ruby Enterprise Edition installer entrypoint.
//!
//! This binary checks that the host can build the source distribution, asks
//! for an installation prefix and builds and installs every component into
//! it. Screens go to stdout; log records and the final error go to stderr.

use clap::Parser;
use log::warn;
use ree_installer::cli::Cli;
use ree_installer::error::{EXIT_SUCCESS, Result};
use ree_installer::exec::SystemCommandExecutor;
use ree_installer::install_flow::{InstallFlow, InstallOutcome};
use ree_installer::output::write_line;
use ree_installer::prefix::install_interrupt_handler;
use std::io::Write;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    if let Err(err) = install_interrupt_handler() {
        warn!("cannot install interrupt handler: {err}");
    }

    let executor = SystemCommandExecutor;
    let mut input = std::io::stdin().lock();
    let mut stdout = std::io::stdout();
    let result = InstallFlow::new(&cli, &executor).run(&mut input, &mut stdout);

    let mut stderr = std::io::stderr();
    let exit_code = exit_code_for_run_result(result, &mut stderr);
    if exit_code != EXIT_SUCCESS {
        std::process::exit(exit_code);
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(cli)));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
    if installed.is_err() {
        // A subscriber is already installed; keep it.
    }
}

fn default_directive(cli: &Cli) -> String {
    cli.log_level().as_str().to_ascii_lowercase()
}

fn exit_code_for_run_result(result: Result<InstallOutcome>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(err) => {
            write_line(stderr, format!("error: {err}"));
            err.exit_code()
        }
    }
}
