/// Identifier mapping between authority column ids and logical slots.
///
/// Authority ids are assigned by the backend once a column is persisted.
/// Logical slots (`slot-1..slot-n`) are positional and stable across
/// sessions, so a peer can address a column before it knows the real id.
///
/// The mapping is rebuilt as a whole from the current column list and never
/// patched. Lookups pass through on a miss: two clients in different mapping
/// epochs still exchange addressable events, and a genuinely unknown id
/// surfaces later as an addressing miss in the reducer.
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::Column;

/// Number of columns a fresh board starts with.
pub const DEFAULT_COLUMN_COUNT: usize = 3;
pub const DEFAULT_COLUMN_NAMES: [&str; DEFAULT_COLUMN_COUNT] = ["To Do", "In Progress", "Done"];

/// Prefix marking a column that exists only on the client.
pub const TEMP_PREFIX: &str = "temp-";

static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^slot-([1-9][0-9]*)$").unwrap());

/// Logical slot id for the column at `position` (0-based).
pub fn slot_id(position: usize) -> String {
    format!("slot-{}", position + 1)
}

/// 1-based slot number of a logical id, or None if `id` is not a slot.
pub fn slot_number(id: &str) -> Option<usize> {
    SLOT_RE.captures(id).and_then(|caps| caps[1].parse().ok())
}

pub fn is_logical(id: &str) -> bool {
    slot_number(id).is_some()
}

pub fn is_temporary(id: &str) -> bool {
    id.starts_with(TEMP_PREFIX)
}

fn default_column_name(position: usize) -> String {
    DEFAULT_COLUMN_NAMES
        .get(position)
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("Column {}", position + 1))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifierMapping {
    /// authority id -> logical slot
    forward: HashMap<String, String>,
    /// logical slot -> authority id
    reverse: HashMap<String, String>,
}

impl IdentifierMapping {
    /// Build both directions positionally from an ordered id list.
    pub fn rebuild<S: AsRef<str>>(authority_ids: &[S]) -> Self {
        let mut forward = HashMap::with_capacity(authority_ids.len());
        let mut reverse = HashMap::with_capacity(authority_ids.len());
        for (position, id) in authority_ids.iter().enumerate() {
            let logical = slot_id(position);
            forward.insert(id.as_ref().to_string(), logical.clone());
            reverse.insert(logical, id.as_ref().to_string());
        }
        Self { forward, reverse }
    }

    pub fn from_columns(columns: &[Column]) -> Self {
        let ids: Vec<&str> = columns.iter().map(|c| c.id.as_str()).collect();
        Self::rebuild(&ids)
    }

    /// Client-only columns used while the authority has none yet.
    /// Ids are `temp-slot-N`, so the mapping built from them is symmetric
    /// with the one a persisted board produces.
    pub fn placeholder_columns(count: usize) -> Vec<Column> {
        (0..count)
            .map(|position| {
                Column::new(
                    format!("{}{}", TEMP_PREFIX, slot_id(position)),
                    default_column_name(position),
                    position,
                )
            })
            .collect()
    }

    /// Authority id -> logical slot, or the input unchanged when unmapped.
    pub fn to_logical(&self, authority_id: &str) -> String {
        self.forward
            .get(authority_id)
            .cloned()
            .unwrap_or_else(|| authority_id.to_string())
    }

    /// Logical slot -> authority id, or the input unchanged when unmapped.
    pub fn to_authority(&self, logical_id: &str) -> String {
        match self.reverse.get(logical_id) {
            Some(id) => id.clone(),
            None => {
                if is_logical(logical_id) {
                    log::debug!(
                        target: "tackboard.mapping",
                        "No column behind {} ({} mapped)",
                        logical_id,
                        self.reverse.len()
                    );
                }
                logical_id.to_string()
            }
        }
    }

    /// Authority ids in slot order, the input `rebuild` needs to reproduce
    /// this mapping.
    pub fn authority_ids(&self) -> Vec<String> {
        let mut slots: Vec<(usize, &String)> = self
            .reverse
            .iter()
            .filter_map(|(logical, id)| slot_number(logical).map(|n| (n, id)))
            .collect();
        slots.sort_by_key(|(n, _)| *n);
        slots.into_iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// True when every mapped authority id is a client-only placeholder.
    pub fn is_temporary(&self) -> bool {
        !self.forward.is_empty() && self.forward.keys().all(|id| is_temporary(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_is_positional_and_bidirectional() {
        let mapping = IdentifierMapping::rebuild(&["colA-uuid", "colB-uuid", "colC-uuid"]);
        assert_eq!(mapping.to_logical("colB-uuid"), "slot-2");
        assert_eq!(mapping.to_authority("slot-3"), "colC-uuid");
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn test_columns_beyond_defaults_get_positional_slots() {
        let ids = ["a", "b", "c", "d", "e"];
        let mapping = IdentifierMapping::rebuild(&ids);
        assert_eq!(mapping.to_logical("e"), "slot-5");
        assert_eq!(mapping.to_authority("slot-4"), "d");
    }

    #[test]
    fn test_miss_passes_through() {
        let mapping = IdentifierMapping::rebuild(&["a"]);
        assert_eq!(mapping.to_logical("zzz"), "zzz");
        assert_eq!(mapping.to_authority("slot-9"), "slot-9");
    }

    #[test]
    fn test_placeholders_are_temporary() {
        let columns = IdentifierMapping::placeholder_columns(DEFAULT_COLUMN_COUNT);
        assert_eq!(columns[0].id, "temp-slot-1");
        assert_eq!(columns[1].name, "In Progress");
        let mapping = IdentifierMapping::from_columns(&columns);
        assert!(mapping.is_temporary());
        assert_eq!(mapping.to_authority("slot-3"), "temp-slot-3");
        assert_eq!(mapping.to_logical("temp-slot-1"), "slot-1");
    }

    #[test]
    fn test_rebuild_replaces_stale_entries() {
        let temp = IdentifierMapping::from_columns(&IdentifierMapping::placeholder_columns(3));
        let real = IdentifierMapping::rebuild(&["r1", "r2", "r3"]);
        assert_ne!(temp, real);
        assert!(!real.is_temporary());
        // the old placeholder is no longer known, so it passes through untouched
        assert_eq!(real.to_logical("temp-slot-1"), "temp-slot-1");
        assert_eq!(real.to_authority("slot-1"), "r1");
    }

    #[test]
    fn test_authority_ids_follow_slot_order() {
        let ids: Vec<String> = (1..=11).map(|n| format!("col-{}", n)).collect();
        let mapping = IdentifierMapping::rebuild(&ids);
        assert_eq!(mapping.authority_ids(), ids);
        assert_eq!(IdentifierMapping::rebuild(&mapping.authority_ids()), mapping);
        assert!(IdentifierMapping::default().authority_ids().is_empty());
    }

    #[test]
    fn test_slot_number() {
        assert_eq!(slot_number("slot-12"), Some(12));
        assert_eq!(slot_number("slot-0"), None);
        assert_eq!(slot_number("temp-slot-1"), None);
        assert!(is_logical("slot-1"));
    }
}
