//! nwra-am - apply local site exposure multipliers to regional wind hazard
//!
//! Usage: `nwra-am -c applymultipliers.toml [-v]`
//!
//! Exits with status 1 only when the configuration is unusable; per-file
//! failures are logged and retried on the next run.

use anyhow::{Context, Result};
use clap::Parser;
use nwra_common::config::TomlConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "nwra-am", version, about = "Apply site exposure multipliers to regional wind hazard rasters")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "NWRA_CONFIG")]
    config: PathBuf,

    /// Also log to stderr when a log file is configured
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be initialised yet
            eprintln!("nwra-am: {:#}", e);
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = TomlConfig::load(&args.config)
        .with_context(|| format!("Invalid configuration {}", args.config.display()))?;

    let log_path = nwra_common::logging::init_logging(&config.logging, args.verbose)
        .context("Cannot initialise logging")?;

    info!("Starting nwra-am");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", args.config.display());
    if let Some(path) = log_path {
        info!("Log file: {}", path.display());
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing files in progress");
            signal_token.cancel();
        }
    });

    let report = nwra_am::run(&config, cancel).await?;

    if !report.not_started.is_empty() {
        warn!(
            "{} regional files were not started and will be processed next run",
            report.not_started.len()
        );
    }
    Ok(())
}
