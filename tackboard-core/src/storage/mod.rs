pub mod local;

use std::collections::HashMap;
use std::sync::Mutex;

/// Durable key/value slots used to mirror the board view locally.
/// Every write replaces the whole value; there are no partial updates.
/// Implementations: FileSlotStore (one file per slot), MemorySlotStore.
pub trait SlotStore: Send + Sync {
    /// Read a slot. Ok(None) when the slot was never written.
    fn read_slot(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite a slot with `value`.
    fn write_slot(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Slot holding the column + card snapshot of a board.
pub fn cards_slot(board_id: &str) -> String {
    format!("board:{}:cards", board_id)
}

/// Slot holding the column id sequence of a board.
pub fn column_order_slot(board_id: &str) -> String {
    format!("board:{}:column-order", board_id)
}

/// Slot holding the authority column order the identifier mapping was built from.
pub fn slot_order_slot(board_id: &str) -> String {
    format!("board:{}:slot-order", board_id)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Slot {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Slot store is unavailable")]
    Unavailable,
}

/// In-process slot store. Used by tests and by clients without a disk.
#[derive(Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlotStore {
    fn read_slot(&self, key: &str) -> Result<Option<String>, StorageError> {
        let slots = self.slots.lock().map_err(|_| StorageError::Unavailable)?;
        Ok(slots.get(key).cloned())
    }

    fn write_slot(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().map_err(|_| StorageError::Unavailable)?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_keys() {
        assert_eq!(cards_slot("b1"), "board:b1:cards");
        assert_eq!(column_order_slot("b1"), "board:b1:column-order");
        assert_eq!(slot_order_slot("b1"), "board:b1:slot-order");
    }

    #[test]
    fn test_memory_store_overwrites_whole_value() {
        let store = MemorySlotStore::new();
        store.write_slot("k", "one").unwrap();
        store.write_slot("k", "two").unwrap();
        assert_eq!(store.read_slot("k").unwrap().as_deref(), Some("two"));
        assert_eq!(store.read_slot("other").unwrap(), None);
    }
}
