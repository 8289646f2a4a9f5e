//! Cattle scheduler entrypoint.

use anyhow::{Context, Result};
use cattle_scheduler::app::{run_until_exit, App};
use cattle_scheduler::config::{Cli, Config};
use cattle_supervise::TerminalError;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting cattle scheduler");

    let config = Config::from_cli(&cli)?;
    info!(
        metadata_url = %config.metadata_url(),
        cattle_url = %config.cattle.url,
        health_check_port = config.health_check_port,
        max_retries = config.retry.budget,
        resync_period_secs = config.resync_period.as_secs(),
        log_level = %config.log_level,
        "Configuration loaded"
    );

    let app = App::bootstrap(&config)
        .await
        .context("connecting to the cluster API")?;
    let exit = app.spawn();

    match run_until_exit(exit, tokio::signal::ctrl_c()).await {
        Some(terminal) => exit_with(terminal),
        None => {
            info!("Received shutdown signal, exiting");
            Ok(())
        }
    }
}

fn exit_with(terminal: TerminalError) -> Result<()> {
    error!(
        subsystem = %terminal.subsystem(),
        kind = %terminal.kind(),
        attempts = terminal.attempts(),
        error = %terminal,
        "Exiting scheduler with error"
    );
    Err(terminal.into())
}
