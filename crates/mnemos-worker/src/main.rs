//! mnemos-worker - Background maintenance for Mnemos
//!
//! Keeps the embedding backlog drained and periodically regroups each
//! owner's memories into topics.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mnemos_sdk::{Mnemos, MnemosConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod worker;

use cli::Cli;
use worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("mnemos_worker=info".parse()?)
                .add_directive("mnemos_sdk=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(MnemosConfig::default_path);
    let mut config = MnemosConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(interval_secs) = cli.interval_secs {
        config.worker.interval_secs = interval_secs;
    }

    let interval = Duration::from_secs(config.worker.interval_secs.max(1));
    let mnemos = Mnemos::open(config).context("failed to open mnemos")?;
    let mut worker = Worker::new(mnemos);

    info!(
        "mnemos-worker v{} (interval {}s)",
        env!("CARGO_PKG_VERSION"),
        interval.as_secs()
    );

    if cli.once {
        worker.tick().await.context("tick failed")?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = worker.tick().await {
                    error!(error = %e, "tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}
