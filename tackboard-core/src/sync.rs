/// Relay wire types shared between the relay server and sync clients.
///
/// Subscribe stream frames (one JSON object per SSE `data:` frame):
///   { type: "connected", boardId, timestamp, connectedClients }
///   { type: "heartbeat", timestamp }
///   { type: "board_update", boardId, updateType, data, timestamp, clientId }
///
/// Publish body: { type, data } with the author in the `x-client-id` header.
/// Publish reply: { success, connectedClients }.
///
/// Column addresses inside `data` are logical slot identifiers whenever the
/// author had a mapping for the column, so peers resolve them independently.
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::{Card, CardPatch};

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Current time as an RFC 3339 string. Display only, never used for ordering.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Opaque per-session client identifier used for self-filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

static CLIENT_COUNTER: AtomicU64 = AtomicU64::new(0);

impl ClientId {
    /// Generate `client_<millis>_<9 hex chars>`.
    /// The suffix hashes a process-wide counter with the nanosecond clock.
    pub fn generate() -> Self {
        use sha2::{Digest, Sha256};
        let seq = CLIENT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(seq.to_le_bytes());
        hasher.update(now.as_nanos().to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("client_{}_{}", now.as_millis(), &digest[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    CardCreated,
    CardMoved,
    CardUpdated,
    ColumnReordered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCreated {
    pub card: Card,
    pub column_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMoved {
    pub card_id: String,
    pub from_column_id: String,
    pub to_column_id: String,
    pub to_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdated {
    pub updated_card: CardPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnReordered {
    pub column_id: String,
    pub from_index: usize,
    pub to_index: usize,
}

/// A board mutation as published by a client: `{ type, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BoardUpdate {
    CardCreated(CardCreated),
    CardMoved(CardMoved),
    CardUpdated(CardUpdated),
    ColumnReordered(ColumnReordered),
}

impl BoardUpdate {
    pub fn update_type(&self) -> UpdateType {
        match self {
            BoardUpdate::CardCreated(_) => UpdateType::CardCreated,
            BoardUpdate::CardMoved(_) => UpdateType::CardMoved,
            BoardUpdate::CardUpdated(_) => UpdateType::CardUpdated,
            BoardUpdate::ColumnReordered(_) => UpdateType::ColumnReordered,
        }
    }

    /// Split into the `updateType` tag and the raw `data` payload.
    pub fn into_parts(self) -> Result<(UpdateType, serde_json::Value), serde_json::Error> {
        let kind = self.update_type();
        let data = match self {
            BoardUpdate::CardCreated(p) => serde_json::to_value(p)?,
            BoardUpdate::CardMoved(p) => serde_json::to_value(p)?,
            BoardUpdate::CardUpdated(p) => serde_json::to_value(p)?,
            BoardUpdate::ColumnReordered(p) => serde_json::to_value(p)?,
        };
        Ok((kind, data))
    }

    /// Rebuild from an `updateType` tag and a raw `data` payload.
    pub fn from_parts(kind: UpdateType, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            UpdateType::CardCreated => BoardUpdate::CardCreated(serde_json::from_value(data)?),
            UpdateType::CardMoved => BoardUpdate::CardMoved(serde_json::from_value(data)?),
            UpdateType::CardUpdated => BoardUpdate::CardUpdated(serde_json::from_value(data)?),
            UpdateType::ColumnReordered => {
                BoardUpdate::ColumnReordered(serde_json::from_value(data)?)
            }
        })
    }
}

/// Frames pushed from the relay to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    #[serde(rename_all = "camelCase")]
    Connected {
        board_id: String,
        timestamp: String,
        connected_clients: usize,
    },
    Heartbeat {
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    BoardUpdate {
        board_id: String,
        update_type: UpdateType,
        data: serde_json::Value,
        timestamp: String,
        client_id: String,
    },
}

impl RelayMessage {
    pub fn connected(board_id: &str, connected_clients: usize) -> Self {
        RelayMessage::Connected {
            board_id: board_id.to_string(),
            timestamp: now_timestamp(),
            connected_clients,
        }
    }

    pub fn heartbeat() -> Self {
        RelayMessage::Heartbeat {
            timestamp: now_timestamp(),
        }
    }

    pub fn board_update(
        board_id: &str,
        client_id: &str,
        update: BoardUpdate,
    ) -> Result<Self, serde_json::Error> {
        let (update_type, data) = update.into_parts()?;
        Ok(RelayMessage::BoardUpdate {
            board_id: board_id.to_string(),
            update_type,
            data,
            timestamp: now_timestamp(),
            client_id: client_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub success: bool,
    pub connected_clients: usize,
}
