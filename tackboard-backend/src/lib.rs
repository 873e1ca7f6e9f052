/// Tackboard relay: config loading, logging, relay state, HTTP server.
pub mod api;
pub mod config;
mod log_bridge;
pub mod relay;
pub mod server;
pub mod state;
pub mod sync_client;

use crate::state::AppState;
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "TACKBOARD_CONFIG";

/// Run the relay until ctrl-c.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = log_bridge::init() {
        eprintln!("failed to initialize relay logger: {}", e);
    }

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (addr, server) = server::spawn_server(AppState::new(config), shutdown_rx).await?;
    log::info!(target: "tackboard.relay", "Relay ready on {}", addr);

    tokio::signal::ctrl_c().await?;
    log::info!(target: "tackboard.shutdown", "Shutting down relay");
    let _ = shutdown_tx.send(true);
    server.await?;
    Ok(())
}
