//! Keyfill CLI - backfill reference tables from fact data

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Cli;
use commands::common::ExitCode;
use commands::{backfill, order, validate};
use kf_core::RunMode;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match &cli.command {
        cli::Commands::Validate => validate::execute(&cli.global).await,
        cli::Commands::Order(args) => order::execute(args, &cli.global).await,
        cli::Commands::Plan(args) => backfill::execute(args, &cli.global, RunMode::Plan).await,
        cli::Commands::Run(args) => backfill::execute(args, &cli.global, RunMode::Apply).await,
    };

    match result {
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => std::process::exit(*code),
            None => Err(err),
        },
        ok => ok,
    }
}

/// Route `log` records from the library crates through a fmt subscriber.
/// `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}
