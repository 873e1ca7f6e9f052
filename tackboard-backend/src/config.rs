/// Configuration for the relay server.
/// Reads relay.json from ~/.config/tackboard/relay.json (or platform equivalent).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Seconds between heartbeat frames on every subscribe stream.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Frames buffered per connection before it counts as broken.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// Publishes accepted per board per second.
    #[serde(default = "default_publish_rate_limit")]
    pub publish_rate_limit: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    256
}

fn default_reap_interval_secs() -> u64 {
    60
}

fn default_publish_rate_limit() -> usize {
    50
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            heartbeat_secs: default_heartbeat_secs(),
            channel_capacity: default_channel_capacity(),
            reap_interval_secs: default_reap_interval_secs(),
            publish_rate_limit: default_publish_rate_limit(),
        }
    }
}

/// Default config path: ~/.config/tackboard/relay.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tackboard")
        .join("relay.json")
}

/// Load config from path. Returns default if the file is missing or invalid.
pub fn load_config(path: &Path) -> RelayConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(target: "tackboard.config", "Failed to parse config {}: {}", path.display(), e);
            RelayConfig::default()
        }),
        Err(_) => {
            log::info!(target: "tackboard.config", "No config at {}, using defaults", path.display());
            RelayConfig::default()
        }
    }
}
