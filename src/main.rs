//! relayd - TCP message relay daemon
//!
//! Accepts inbound connections, runs one session per connection, and
//! persists relayed messages to an append-only log.

use relayd_server::{Config, Server, ServerConfig};
use relayd_storage::MessageStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if RELAYD_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("RELAYD_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("RELAYD_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting relayd server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Accept backlog: {}", config.network.accept_backlog);
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());

    // The schema itself is ensured by the server before it starts accepting.
    let store = Arc::new(MessageStore::open(&config.storage.data_dir));

    let server_config =
        ServerConfig::new(config.network.bind_addr).with_backlog(config.network.accept_backlog);
    let server = Arc::new(Server::new(server_config, store));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.stop(true);
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
