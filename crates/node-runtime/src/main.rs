//! # Rollups Node
//!
//! Entry point. Exits with status 0 after SIGINT/SIGTERM and 1 on any
//! error that reaches `main`.

use anyhow::{Context, Result};
use clap::Parser;
use rollups_node::{Cli, NodeConfig, NodeRuntime, ServiceContainer};
use rollups_telemetry::{init_logging, Metrics};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_cli(Cli::parse()).context("invalid configuration")?;
    init_logging(&config.telemetry).context("failed to initialize logging")?;

    info!("===========================================");
    info!("  Rollups Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(?config, "Configuration loaded");

    let metrics = Metrics::new().context("failed to register metrics")?;
    let container = ServiceContainer::connect(config, metrics)
        .await
        .context("startup checks failed")?;

    NodeRuntime::new(container).run().await?;
    info!("Node shutdown complete");
    Ok(())
}
