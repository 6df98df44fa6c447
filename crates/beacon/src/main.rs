//! # beacon
//!
//! Relay server binary: loads settings, installs logging and metrics, and
//! serves HTTP + WebSocket until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use beacon_server::BeaconServer;
use beacon_settings::BeaconSettings;
use clap::Parser;

/// Real-time vehicle location relay.
#[derive(Parser, Debug)]
#[command(name = "beacon", about = "Real-time vehicle location relay")]
struct Cli {
    /// JSON settings file (falls back to `BEACON_CONFIG`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn apply(self, settings: &mut BeaconSettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = beacon_settings::load_settings(cli.config.as_deref())
        .context("Failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    beacon_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = beacon_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = BeaconServer::new(&settings, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("beacon relay listening on http://{addr} (ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], settings.server.shutdown_timeout())
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
