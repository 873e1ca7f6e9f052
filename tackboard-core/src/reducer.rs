/// Board reducer: a pure function from (view, operation) to a new view.
///
/// Every source of change (optimistic local edit, peer broadcast, and
/// authoritative reload) goes through `reduce`. The operations are shaped so
/// that replays tolerate reordering and duplicate delivery:
/// - insert is a no-op when the card already exists anywhere on the board
/// - move addresses the card by id, so an echo of an applied move is a no-op
/// - merge only overwrites the fields present in the patch
use crate::types::{BoardView, Card, CardPatch, Column};

#[derive(Debug, Clone, PartialEq)]
pub enum BoardOp {
    /// Insert at `index`, or append when `index` is None.
    InsertCard {
        column_id: String,
        index: Option<usize>,
        card: Card,
    },
    MoveCard {
        card_id: String,
        from_column_id: String,
        to_column_id: String,
        to_index: usize,
    },
    MergeCard {
        patch: CardPatch,
    },
    MoveColumn {
        column_id: String,
        to_index: usize,
    },
    ReplaceAll {
        columns: Vec<Column>,
    },
}

impl BoardOp {
    pub fn name(&self) -> &'static str {
        match self {
            BoardOp::InsertCard { .. } => "insert_card",
            BoardOp::MoveCard { .. } => "move_card",
            BoardOp::MergeCard { .. } => "merge_card",
            BoardOp::MoveColumn { .. } => "move_column",
            BoardOp::ReplaceAll { .. } => "replace_all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReduceError {
    /// Addressing miss: the operation names a column this view does not have.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Card {0} has an empty title")]
    InvalidCard(String),

    #[error("Duplicate column id: {0}")]
    DuplicateColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Changed(BoardView),
    Unchanged,
}

impl Outcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Outcome::Changed(_))
    }
}

pub fn reduce(view: &BoardView, op: &BoardOp) -> Result<Outcome, ReduceError> {
    match op {
        BoardOp::InsertCard {
            column_id,
            index,
            card,
        } => insert_card(view, column_id, *index, card),
        BoardOp::MoveCard {
            card_id,
            from_column_id,
            to_column_id,
            to_index,
        } => move_card(view, card_id, from_column_id, to_column_id, *to_index),
        BoardOp::MergeCard { patch } => merge_card(view, patch),
        BoardOp::MoveColumn {
            column_id,
            to_index,
        } => move_column(view, column_id, *to_index),
        BoardOp::ReplaceAll { columns } => replace_all(view, columns),
    }
}

fn changed_if_different(before: &BoardView, after: BoardView) -> Outcome {
    if &after == before {
        Outcome::Unchanged
    } else {
        Outcome::Changed(after)
    }
}

fn insert_card(
    view: &BoardView,
    column_id: &str,
    index: Option<usize>,
    card: &Card,
) -> Result<Outcome, ReduceError> {
    if view.contains_card(&card.id) {
        return Ok(Outcome::Unchanged);
    }
    if !card.has_valid_title() {
        return Err(ReduceError::InvalidCard(card.id.clone()));
    }
    let col_idx = view
        .column_index(column_id)
        .ok_or_else(|| ReduceError::UnknownColumn(column_id.to_string()))?;

    let mut next = view.clone();
    let cards = &mut next.columns[col_idx].cards;
    let at = index.map_or(cards.len(), |i| i.min(cards.len()));
    cards.insert(at, card.clone());
    Ok(Outcome::Changed(next))
}

fn move_card(
    view: &BoardView,
    card_id: &str,
    from_column_id: &str,
    to_column_id: &str,
    to_index: usize,
) -> Result<Outcome, ReduceError> {
    let from_idx = view
        .column_index(from_column_id)
        .ok_or_else(|| ReduceError::UnknownColumn(from_column_id.to_string()))?;
    let to_idx = view
        .column_index(to_column_id)
        .ok_or_else(|| ReduceError::UnknownColumn(to_column_id.to_string()))?;

    // The card may already have left the source column (local optimistic
    // move, or an earlier event): fall back to locating it by id.
    let (src_col, src_pos) = match view.columns[from_idx].card_index(card_id) {
        Some(pos) => (from_idx, pos),
        None => view
            .find_card(card_id)
            .ok_or_else(|| ReduceError::CardNotFound(card_id.to_string()))?,
    };

    let mut next = view.clone();
    let card = next.columns[src_col].cards.remove(src_pos);
    let dest = &mut next.columns[to_idx].cards;
    let at = to_index.min(dest.len());
    dest.insert(at, card);
    Ok(changed_if_different(view, next))
}

fn merge_card(view: &BoardView, patch: &CardPatch) -> Result<Outcome, ReduceError> {
    let (col, pos) = view
        .find_card(&patch.id)
        .ok_or_else(|| ReduceError::CardNotFound(patch.id.clone()))?;

    let mut next = view.clone();
    let card = &mut next.columns[col].cards[pos];
    if let Some(title) = patch.title.as_deref().map(str::trim) {
        // a blank title would break the card invariant; keep the old one
        if !title.is_empty() {
            card.title = title.to_string();
        }
    }
    if let Some(description) = patch.description.as_deref() {
        let description = description.trim();
        card.description = if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        };
    }
    Ok(changed_if_different(view, next))
}

fn move_column(view: &BoardView, column_id: &str, to_index: usize) -> Result<Outcome, ReduceError> {
    let from = view
        .column_index(column_id)
        .ok_or_else(|| ReduceError::UnknownColumn(column_id.to_string()))?;

    let mut next = view.clone();
    let column = next.columns.remove(from);
    let at = to_index.min(next.columns.len());
    next.columns.insert(at, column);
    Ok(changed_if_different(view, next))
}

fn replace_all(view: &BoardView, columns: &[Column]) -> Result<Outcome, ReduceError> {
    let mut seen = std::collections::HashSet::with_capacity(columns.len());
    for column in columns {
        if !seen.insert(column.id.as_str()) {
            return Err(ReduceError::DuplicateColumn(column.id.clone()));
        }
    }
    Ok(changed_if_different(view, BoardView::new(columns.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str) -> Card {
        Card::new(id, &format!("Card {}", id), None).unwrap()
    }

    fn board() -> BoardView {
        let mut a = Column::new("colA", "To Do", 0);
        a.cards.push(card("c1"));
        a.cards.push(card("c2"));
        let b = Column::new("colB", "In Progress", 1);
        let c = Column::new("colC", "Done", 2);
        BoardView::new(vec![a, b, c])
    }

    fn apply(view: &BoardView, op: BoardOp) -> BoardView {
        match reduce(view, &op).unwrap() {
            Outcome::Changed(next) => next,
            Outcome::Unchanged => view.clone(),
        }
    }

    #[test]
    fn test_insert_appends_by_default() {
        let next = apply(
            &board(),
            BoardOp::InsertCard {
                column_id: "colA".into(),
                index: None,
                card: card("c3"),
            },
        );
        assert_eq!(next.columns[0].cards[2].id, "c3");
    }

    #[test]
    fn test_insert_is_idempotent() {
        let op = BoardOp::InsertCard {
            column_id: "colB".into(),
            index: Some(0),
            card: card("c9"),
        };
        let once = apply(&board(), op.clone());
        assert_eq!(reduce(&once, &op).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_insert_existing_card_elsewhere_is_noop() {
        let op = BoardOp::InsertCard {
            column_id: "colC".into(),
            index: None,
            card: card("c1"),
        };
        assert_eq!(reduce(&board(), &op).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_insert_rejects_blank_title() {
        let bad = Card {
            id: "x".into(),
            title: "   ".into(),
            description: None,
        };
        let op = BoardOp::InsertCard {
            column_id: "colA".into(),
            index: None,
            card: bad,
        };
        assert_eq!(reduce(&board(), &op), Err(ReduceError::InvalidCard("x".into())));
    }

    #[test]
    fn test_redelivered_insert_skips_title_check() {
        let stale = Card {
            id: "c1".into(),
            title: "".into(),
            description: None,
        };
        let op = BoardOp::InsertCard {
            column_id: "colA".into(),
            index: None,
            card: stale,
        };
        assert_eq!(reduce(&board(), &op).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_insert_into_unknown_column_is_addressing_miss() {
        let op = BoardOp::InsertCard {
            column_id: "temp-slot-1".into(),
            index: None,
            card: card("c5"),
        };
        assert_eq!(
            reduce(&board(), &op),
            Err(ReduceError::UnknownColumn("temp-slot-1".into()))
        );
    }

    #[test]
    fn test_move_between_columns() {
        let next = apply(
            &board(),
            BoardOp::MoveCard {
                card_id: "c2".into(),
                from_column_id: "colA".into(),
                to_column_id: "colB".into(),
                to_index: 0,
            },
        );
        assert_eq!(next.columns[0].cards.len(), 1);
        assert_eq!(next.columns[1].cards[0].id, "c2");
        assert_eq!(next.card_count(), 2);
    }

    #[test]
    fn test_move_echo_is_noop() {
        let op = BoardOp::MoveCard {
            card_id: "c1".into(),
            from_column_id: "colA".into(),
            to_column_id: "colC".into(),
            to_index: 0,
        };
        let once = apply(&board(), op.clone());
        assert_eq!(reduce(&once, &op).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_move_within_column_clamps_index() {
        let next = apply(
            &board(),
            BoardOp::MoveCard {
                card_id: "c1".into(),
                from_column_id: "colA".into(),
                to_column_id: "colA".into(),
                to_index: 99,
            },
        );
        let ids: Vec<_> = next.columns[0].cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn test_move_unknown_card() {
        let op = BoardOp::MoveCard {
            card_id: "nope".into(),
            from_column_id: "colA".into(),
            to_column_id: "colB".into(),
            to_index: 0,
        };
        assert_eq!(reduce(&board(), &op), Err(ReduceError::CardNotFound("nope".into())));
    }

    #[test]
    fn test_merge_updates_present_fields_only() {
        let next = apply(
            &board(),
            BoardOp::MergeCard {
                patch: CardPatch {
                    id: "c2".into(),
                    title: None,
                    description: Some("details".into()),
                },
            },
        );
        let card = &next.columns[0].cards[1];
        assert_eq!(card.title, "Card c2");
        assert_eq!(card.description.as_deref(), Some("details"));
    }

    #[test]
    fn test_merge_ignores_blank_title() {
        let op = BoardOp::MergeCard {
            patch: CardPatch {
                id: "c1".into(),
                title: Some("  ".into()),
                description: None,
            },
        };
        assert_eq!(reduce(&board(), &op).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_move_column() {
        let next = apply(
            &board(),
            BoardOp::MoveColumn {
                column_id: "colC".into(),
                to_index: 0,
            },
        );
        assert_eq!(next.column_ids(), vec!["colC", "colA", "colB"]);
    }

    #[test]
    fn test_replace_all_rejects_duplicate_ids() {
        let columns = vec![Column::new("x", "One", 0), Column::new("x", "Two", 1)];
        assert_eq!(
            reduce(&board(), &BoardOp::ReplaceAll { columns }),
            Err(ReduceError::DuplicateColumn("x".into()))
        );
    }
}
