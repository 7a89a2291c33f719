//! CLI entry point.
//!
//! `run()` parses arguments, loads configuration, owns the tokio runtime, and
//! prints every error. `main` only maps the returned [`ExitCode`].

use clap::Parser;
use switchyard_config::{Config, ConfigError};
use switchyard_dispatch::DispatchError;
use switchyard_providers::RegistryError;
use switchyard_utils::logging::init_tracing;
use switchyard_utils::render_report;

use super::args::Cli;
use super::commands;
use crate::ExitCode;

pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let config = match Config::discover(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", report(&err));
            return Err(ExitCode::CLI_ARGS);
        }
    };
    tracing::debug!(source = ?config.source, "configuration loaded");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    match rt.block_on(commands::execute(cli.command, config)) {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => {
            eprintln!("{}", report(&err));
            Err(exit_code_for(&err))
        }
    }
}

/// Render known error types through their user-facing report.
fn report(err: &anyhow::Error) -> String {
    if let Some(e) = err.downcast_ref::<DispatchError>() {
        return render_report(e);
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return render_report(e);
    }
    format!("✗ {err:#}")
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<DispatchError>() {
        return ExitCode::from(e);
    }
    if err.downcast_ref::<ConfigError>().is_some() || err.downcast_ref::<RegistryError>().is_some()
    {
        return ExitCode::CLI_ARGS;
    }
    ExitCode::INTERNAL
}
