/// Client-side sync configuration.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::ReconnectPolicy;
use crate::mapping::DEFAULT_COLUMN_COUNT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncClientConfig {
    /// Base URL of the relay, e.g. `http://127.0.0.1:8080`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default = "default_column_count")]
    pub default_columns: usize,
    /// Directory for the durable board mirror. None keeps it in memory.
    #[serde(default)]
    pub slot_dir: Option<PathBuf>,
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_column_count() -> usize {
    DEFAULT_COLUMN_COUNT
}

fn default_publish_timeout_secs() -> u64 {
    10
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            reconnect: ReconnectPolicy::default(),
            default_columns: default_column_count(),
            slot_dir: None,
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }
}

impl SyncClientConfig {
    pub fn subscribe_url(&self, board_id: &str) -> String {
        format!("{}/api/subscribe/{}", self.base(), board_id)
    }

    pub fn publish_url(&self, board_id: &str) -> String {
        format!("{}/api/boards/{}/updates", self.base(), board_id)
    }

    fn base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}
