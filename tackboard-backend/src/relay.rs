/// Event relay: per-board fan-out of relay frames to open subscriber streams.
///
/// One instance per process, shared through `AppState`. The connection table
/// is a board -> (connection -> sender) map behind a single mutex; subscribe,
/// unsubscribe and publish all take it, and it is never held across an await.
///
/// Each connection owns a bounded queue. A closed or full queue counts as a
/// failed delivery and the connection is dropped during that publish; its
/// subscriber sees the stream end and reconnects.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tackboard_core::sync::RelayMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A serialized relay frame, shared by every recipient of one publish.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving half of one subscription.
pub struct Connection {
    pub id: ConnectionId,
    pub board_id: String,
    pub frames: mpsc::Receiver<Frame>,
}

type BoardConnections = HashMap<ConnectionId, mpsc::Sender<Frame>>;

pub struct EventRelay {
    boards: Mutex<HashMap<String, BoardConnections>>,
    capacity: usize,
}

impl EventRelay {
    pub fn new(capacity: usize) -> Self {
        Self {
            boards: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn boards(&self) -> MutexGuard<'_, HashMap<String, BoardConnections>> {
        self.boards.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new connection for `board_id`.
    pub fn subscribe(&self, board_id: &str) -> Connection {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = ConnectionId(Uuid::new_v4());
        self.boards()
            .entry(board_id.to_string())
            .or_default()
            .insert(id, tx);
        log::info!(target: "tackboard.relay", "Connection {} subscribed to board {}", id, board_id);
        Connection {
            id,
            board_id: board_id.to_string(),
            frames: rx,
        }
    }

    /// Remove a connection. Drops the board entry once it has none left.
    pub fn unsubscribe(&self, board_id: &str, id: ConnectionId) -> bool {
        let mut boards = self.boards();
        let Some(connections) = boards.get_mut(board_id) else {
            return false;
        };
        let removed = connections.remove(&id).is_some();
        if connections.is_empty() {
            boards.remove(board_id);
        }
        if removed {
            log::info!(
                target: "tackboard.relay",
                "Connection {} unsubscribed from board {}",
                id,
                board_id
            );
        }
        removed
    }

    /// Deliver `message` to every connection of `board_id`.
    /// Returns the number of connections reached.
    pub fn publish(&self, board_id: &str, message: &RelayMessage) -> usize {
        let frame: Frame = match serde_json::to_string(message) {
            Ok(json) => json.into(),
            Err(e) => {
                log::error!(target: "tackboard.relay", "Failed to encode relay frame: {}", e);
                return 0;
            }
        };
        self.publish_frame(board_id, frame)
    }

    pub fn publish_frame(&self, board_id: &str, frame: Frame) -> usize {
        let mut boards = self.boards();
        let Some(connections) = boards.get_mut(board_id) else {
            return 0;
        };

        let mut reached = 0;
        let mut failed = Vec::new();
        for (id, tx) in connections.iter() {
            match tx.try_send(frame.clone()) {
                Ok(()) => reached += 1,
                Err(e) => {
                    log::warn!(
                        target: "tackboard.relay",
                        "Dropping connection {} on board {}: {}",
                        id,
                        board_id,
                        e
                    );
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            connections.remove(&id);
        }
        if connections.is_empty() {
            boards.remove(board_id);
        }
        reached
    }

    pub fn connection_count(&self, board_id: &str) -> usize {
        self.boards().get(board_id).map_or(0, |c| c.len())
    }

    pub fn total_connections(&self) -> usize {
        self.boards().values().map(|c| c.len()).sum()
    }

    pub fn board_count(&self) -> usize {
        self.boards().len()
    }

    /// Remove connections whose receiver is gone. Returns how many were removed.
    pub fn reap_closed(&self) -> usize {
        let mut boards = self.boards();
        let mut removed = 0;
        boards.retain(|_, connections| {
            let before = connections.len();
            connections.retain(|_, tx| !tx.is_closed());
            removed += before - connections.len();
            !connections.is_empty()
        });
        removed
    }

    /// Drop every connection, ending all subscriber streams.
    pub fn close_all(&self) {
        let mut boards = self.boards();
        let total: usize = boards.values().map(|c| c.len()).sum();
        boards.clear();
        if total > 0 {
            log::info!(target: "tackboard.relay", "Closed {} relay connections", total);
        }
    }
}
