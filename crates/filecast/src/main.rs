//! # filecast
//!
//! Relay server binary: loads settings, starts the WebSocket relay and runs
//! until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use filecast_server::config::ServerConfig;
use filecast_server::server::RelayServer;
use filecast_server::{logging, metrics, shutdown};
use filecast_settings::{FilecastSettings, load_settings_from_path, settings_path};

/// WebSocket relay that rebroadcasts file snippets to every connected client.
#[derive(Parser, Debug)]
#[command(name = "filecast", about = "filecast relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.filecast/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Per-client write timeout in milliseconds (overrides settings).
    #[arg(long)]
    write_timeout_ms: Option<u64>,
}

impl Cli {
    /// Load the settings file, then layer command-line flags on top.
    fn resolve_settings(&self) -> Result<FilecastSettings> {
        let path = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ms) = self.write_timeout_ms {
            settings.server.write_timeout_ms = ms;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings.validate().context("Invalid command-line override")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    logging::init_subscriber(&settings.logging.level);

    let metrics_handle =
        metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = RelayServer::new(ServerConfig::from(&settings.server), metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!("filecast relay listening on ws://{addr}/ws");

    shutdown::wait_for_signal()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().graceful_shutdown(vec![handle], None).await {
        tracing::warn!("relay did not stop cleanly");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
