//! Warfront Relay Server
//!
//! Starts one supervised worker per shard. Each worker relays turns for the
//! games hashed to it; a public lobby is opened on the creation schedule.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warfront::{
    network::{LogArchive, ServerConfig, Supervisor},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;

    info!("Warfront Server v{}", VERSION);
    info!("Workers: {} (ports {}..)", config.num_workers, config.base_port);
    info!("Turn interval: {} ms", config.turn_interval.as_millis());

    let supervisor = Supervisor::new(Arc::new(config), Arc::new(LogArchive));
    tokio::select! {
        _ = supervisor.run() => {
            info!("all workers exited");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutdown signal received");
        }
    }
    Ok(())
}
