mod cli;
mod commands;
mod model;
mod table;
mod util;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, VerifyArgs};

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Closure(args)) => commands::closure::run(args).map(|_| ExitCode::SUCCESS),
        Some(Commands::Merge(args)) => commands::merge::run(args).map(|_| ExitCode::SUCCESS),
        Some(Commands::Verify(args)) => commands::verify::run(args),
        Some(Commands::Status(args)) => commands::status::run(args).map(|_| ExitCode::SUCCESS),
        None => commands::verify::run(VerifyArgs::default()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
