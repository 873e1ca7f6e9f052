/// Local reconciliation store: the single-writer board view of one client.
///
/// Wraps the pure reducer with the identifier mapping and a durable mirror.
/// After every change the column list is written to `board:<id>:cards` and
/// the column order to `board:<id>:column-order`, so a restart can show the
/// last known view before the network answers. The authority order behind
/// the identifier mapping goes to `board:<id>:slot-order`, since the display
/// order may differ from it after a local column reorder. Storage failures are logged
/// and never block a mutation.
use std::sync::Arc;

use crate::mapping::IdentifierMapping;
use crate::reducer::{self, BoardOp, Outcome, ReduceError};
use crate::storage::{self, SlotStore, StorageError};
use crate::types::{BoardView, Column};

pub struct ReconciliationStore {
    board_id: String,
    view: BoardView,
    mapping: IdentifierMapping,
    slots: Arc<dyn SlotStore>,
    default_columns: usize,
}

impl ReconciliationStore {
    pub fn new(board_id: impl Into<String>, slots: Arc<dyn SlotStore>, default_columns: usize) -> Self {
        Self {
            board_id: board_id.into(),
            view: BoardView::default(),
            mapping: IdentifierMapping::default(),
            slots,
            default_columns,
        }
    }

    /// Create a store pre-filled from the durable mirror.
    /// Missing or corrupt slots leave the view empty.
    pub fn restore(board_id: impl Into<String>, slots: Arc<dyn SlotStore>, default_columns: usize) -> Self {
        let mut store = Self::new(board_id, slots, default_columns);
        match store.read_saved_columns() {
            Ok(Some(columns)) => {
                store.mapping = match store.read_saved_slot_order() {
                    Ok(Some(ids)) if !ids.is_empty() => IdentifierMapping::rebuild(&ids),
                    Ok(_) => IdentifierMapping::from_columns(&columns),
                    Err(e) => {
                        log::warn!(target: "tackboard.store", "Ignoring saved slot order: {}", e);
                        IdentifierMapping::from_columns(&columns)
                    }
                };
                let columns = store.overlay_saved_order(columns);
                log::info!(
                    target: "tackboard.store",
                    "Restored {} columns for board {} from local mirror",
                    columns.len(),
                    store.board_id
                );
                store.view = BoardView::new(columns);
            }
            Ok(None) => {}
            Err(e) => log::warn!(
                target: "tackboard.store",
                "Ignoring unreadable mirror for board {}: {}",
                store.board_id,
                e
            ),
        }
        store
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn view(&self) -> &BoardView {
        &self.view
    }

    pub fn mapping(&self) -> &IdentifierMapping {
        &self.mapping
    }

    /// Apply one reducer operation. Returns whether the view changed.
    pub fn apply(&mut self, op: &BoardOp) -> Result<bool, ReduceError> {
        match reducer::reduce(&self.view, op)? {
            Outcome::Changed(next) => {
                self.view = next;
                self.mirror();
                Ok(true)
            }
            Outcome::Unchanged => Ok(false),
        }
    }

    /// Full replace from authoritative data; the authority wins for cards.
    ///
    /// The identifier mapping is rebuilt from the authoritative order. An
    /// empty authority list yields temporary placeholder columns, which keep
    /// the cards saved in the mirror since they exist nowhere else. The saved
    /// column order is overlaid afterwards because the authority does not
    /// persist it.
    pub fn load_authoritative(&mut self, columns: Vec<Column>) -> Result<bool, ReduceError> {
        let columns = if columns.is_empty() {
            log::info!(
                target: "tackboard.store",
                "Board {} has no persisted columns, using placeholders",
                self.board_id
            );
            self.with_saved_cards(IdentifierMapping::placeholder_columns(self.default_columns))
        } else {
            columns
        };

        let mapping = IdentifierMapping::from_columns(&columns);
        let ordered = self.overlay_saved_order(columns);
        let changed = self.apply(&BoardOp::ReplaceAll { columns: ordered })?;
        self.mapping = mapping;
        self.mirror();
        Ok(changed)
    }

    fn read_saved_columns(&self) -> Result<Option<Vec<Column>>, StorageError> {
        let key = storage::cards_slot(&self.board_id);
        match self.slots.read_slot(&key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Corrupt { key, source }),
            None => Ok(None),
        }
    }

    fn read_saved_order(&self) -> Result<Option<Vec<String>>, StorageError> {
        self.read_id_list(storage::column_order_slot(&self.board_id))
    }

    fn read_saved_slot_order(&self) -> Result<Option<Vec<String>>, StorageError> {
        self.read_id_list(storage::slot_order_slot(&self.board_id))
    }

    fn read_id_list(&self, key: String) -> Result<Option<Vec<String>>, StorageError> {
        match self.slots.read_slot(&key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Corrupt { key, source }),
            None => Ok(None),
        }
    }

    fn with_saved_cards(&self, mut columns: Vec<Column>) -> Vec<Column> {
        let saved = match self.read_saved_columns() {
            Ok(Some(saved)) => saved,
            Ok(None) => return columns,
            Err(e) => {
                log::warn!(target: "tackboard.store", "Ignoring saved cards: {}", e);
                return columns;
            }
        };
        for column in &mut columns {
            if let Some(saved_col) = saved.iter().find(|s| s.id == column.id) {
                column.cards = saved_col.cards.clone();
            }
        }
        columns
    }

    /// Reorder by the saved column order; unknown columns keep their
    /// relative order at the end.
    fn overlay_saved_order(&self, columns: Vec<Column>) -> Vec<Column> {
        let order = match self.read_saved_order() {
            Ok(Some(order)) => order,
            Ok(None) => return columns,
            Err(e) => {
                log::warn!(target: "tackboard.store", "Ignoring saved column order: {}", e);
                return columns;
            }
        };
        let mut remaining: Vec<Option<Column>> = columns.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(remaining.len());
        for id in &order {
            if let Some(slot) = remaining
                .iter_mut()
                .find(|c| c.as_ref().is_some_and(|c| &c.id == id))
            {
                ordered.extend(slot.take());
            }
        }
        ordered.extend(remaining.into_iter().flatten());
        ordered
    }

    fn mirror(&self) {
        if let Err(e) = self.write_mirror() {
            log::warn!(
                target: "tackboard.store",
                "Failed to mirror board {}: {}",
                self.board_id,
                e
            );
        }
    }

    fn write_mirror(&self) -> Result<(), StorageError> {
        let cards = serde_json::to_string(&self.view.columns)?;
        let order = serde_json::to_string(&self.view.column_ids())?;
        let slot_order = serde_json::to_string(&self.mapping.authority_ids())?;
        self.slots.write_slot(&storage::cards_slot(&self.board_id), &cards)?;
        self.slots
            .write_slot(&storage::column_order_slot(&self.board_id), &order)?;
        self.slots
            .write_slot(&storage::slot_order_slot(&self.board_id), &slot_order)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::decode_update;
    use crate::storage::MemorySlotStore;
    use crate::sync::{BoardUpdate, CardCreated};
    use crate::types::Card;

    fn real_columns() -> Vec<Column> {
        let mut a = Column::new("colA-uuid", "To Do", 0);
        a.cards.push(Card::new("c1", "First", None).unwrap());
        vec![
            a,
            Column::new("colB-uuid", "In Progress", 1),
            Column::new("colC-uuid", "Done", 2),
        ]
    }

    fn slots() -> Arc<dyn SlotStore> {
        Arc::new(MemorySlotStore::new())
    }

    #[test]
    fn test_load_rebuilds_mapping() {
        let mut store = ReconciliationStore::new("b1", slots(), 3);
        store.load_authoritative(real_columns()).unwrap();
        assert_eq!(store.mapping().to_authority("slot-2"), "colB-uuid");
        assert_eq!(store.view().columns.len(), 3);
    }

    #[test]
    fn test_empty_authority_uses_placeholders() {
        let mut store = ReconciliationStore::new("b1", slots(), 3);
        store.load_authoritative(Vec::new()).unwrap();
        assert!(store.mapping().is_temporary());
        assert_eq!(store.view().columns[0].id, "temp-slot-1");
    }

    #[test]
    fn test_mutation_is_mirrored_and_restored() {
        let shared = slots();
        let mut store = ReconciliationStore::new("b1", shared.clone(), 3);
        store.load_authoritative(real_columns()).unwrap();
        store
            .apply(&BoardOp::MoveColumn {
                column_id: "colC-uuid".into(),
                to_index: 0,
            })
            .unwrap();

        let restored = ReconciliationStore::restore("b1", shared, 3);
        assert_eq!(
            restored.view().column_ids(),
            vec!["colC-uuid", "colA-uuid", "colB-uuid"]
        );
        assert!(restored.view().contains_card("c1"));
    }

    #[test]
    fn test_restore_keeps_authority_slots_after_reorder() {
        let shared = slots();
        let mut store = ReconciliationStore::new("b1", shared.clone(), 3);
        store.load_authoritative(real_columns()).unwrap();
        store
            .apply(&BoardOp::MoveColumn {
                column_id: "colC-uuid".into(),
                to_index: 0,
            })
            .unwrap();

        let mut restored = ReconciliationStore::restore("b1", shared, 3);
        assert_eq!(
            restored.view().column_ids(),
            vec!["colC-uuid", "colA-uuid", "colB-uuid"]
        );
        assert_eq!(restored.mapping(), store.mapping());
        assert_eq!(restored.mapping().to_authority("slot-1"), "colA-uuid");
        assert_eq!(restored.mapping().to_logical("colC-uuid"), "slot-3");

        // a peer card addressed to slot-1 still lands in the first authority column
        let update = BoardUpdate::CardCreated(CardCreated {
            card: Card::new("p1", "From peer", None).unwrap(),
            column_id: "slot-1".into(),
        });
        let peer = decode_update(update, restored.mapping());
        restored.apply(&peer).unwrap();
        let (column, _) = restored.view().find_card("p1").unwrap();
        assert_eq!(restored.view().columns[column].id, "colA-uuid");
    }

    #[test]
    fn test_saved_order_survives_authoritative_reload() {
        let shared = slots();
        let mut store = ReconciliationStore::new("b1", shared.clone(), 3);
        store.load_authoritative(real_columns()).unwrap();
        store
            .apply(&BoardOp::MoveColumn {
                column_id: "colA-uuid".into(),
                to_index: 2,
            })
            .unwrap();

        let mut fresh = ReconciliationStore::new("b1", shared, 3);
        fresh.load_authoritative(real_columns()).unwrap();
        assert_eq!(
            fresh.view().column_ids(),
            vec!["colB-uuid", "colC-uuid", "colA-uuid"]
        );
        // mapping stays positional over the authoritative order
        assert_eq!(fresh.mapping().to_authority("slot-1"), "colA-uuid");
    }

    #[test]
    fn test_placeholder_cards_come_back_from_mirror() {
        let shared = slots();
        let mut store = ReconciliationStore::new("b1", shared.clone(), 3);
        store.load_authoritative(Vec::new()).unwrap();
        store
            .apply(&BoardOp::InsertCard {
                column_id: "temp-slot-2".into(),
                index: None,
                card: Card::new("local-1", "Offline card", None).unwrap(),
            })
            .unwrap();

        let mut reloaded = ReconciliationStore::new("b1", shared, 3);
        reloaded.load_authoritative(Vec::new()).unwrap();
        assert_eq!(reloaded.view().find_card("local-1"), Some((1, 0)));
    }

    #[test]
    fn test_stale_temporary_address_is_dropped_after_rebuild() {
        let mut store = ReconciliationStore::new("b1", slots(), 3);
        store.load_authoritative(Vec::new()).unwrap();
        assert!(store.mapping().is_temporary());

        store.load_authoritative(real_columns()).unwrap();
        assert!(!store.mapping().is_temporary());
        assert_eq!(store.mapping().to_authority("temp-slot-2"), "temp-slot-2");

        let stale = BoardOp::InsertCard {
            column_id: store.mapping().to_authority("temp-slot-2"),
            index: None,
            card: Card::new("k9", "Late", None).unwrap(),
        };
        assert_eq!(
            store.apply(&stale),
            Err(ReduceError::UnknownColumn("temp-slot-2".into()))
        );
        assert!(!store.view().contains_card("k9"));
    }

    #[test]
    fn test_corrupt_mirror_is_treated_as_empty() {
        let shared = slots();
        shared
            .write_slot(&storage::cards_slot("b1"), "{not json")
            .unwrap();
        let store = ReconciliationStore::restore("b1", shared, 3);
        assert!(store.view().columns.is_empty());
    }
}
