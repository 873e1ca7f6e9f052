use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::Config;
use tackboard_core::reducer::{reduce, BoardOp, Outcome};
use tackboard_core::types::{BoardView, Card, Column};

const COLUMNS: [&str; 3] = ["colA-uuid", "colB-uuid", "colC-uuid"];

/// (create?, target column, target index) per card.
type CardPlan = (bool, usize, usize);

fn base_view(plans: &[CardPlan]) -> BoardView {
    let mut columns: Vec<Column> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, id)| Column::new(*id, format!("Column {}", i + 1), i))
        .collect();
    for (i, (create, _, _)) in plans.iter().enumerate() {
        if !create {
            let card = Card::new(format!("m{}", i), "Existing", None).unwrap();
            columns[i % COLUMNS.len()].cards.push(card);
        }
    }
    BoardView::new(columns)
}

fn ops_for(plans: &[CardPlan]) -> Vec<BoardOp> {
    plans
        .iter()
        .enumerate()
        .map(|(i, &(create, target, index))| {
            if create {
                BoardOp::InsertCard {
                    column_id: COLUMNS[target].to_string(),
                    index: None,
                    card: Card::new(format!("n{}", i), "New", None).unwrap(),
                }
            } else {
                BoardOp::MoveCard {
                    card_id: format!("m{}", i),
                    from_column_id: COLUMNS[i % COLUMNS.len()].to_string(),
                    to_column_id: COLUMNS[target].to_string(),
                    to_index: index,
                }
            }
        })
        .collect()
}

fn replay(view: &BoardView, ops: &[BoardOp]) -> BoardView {
    ops.iter().fold(view.clone(), |acc, op| match reduce(&acc, op) {
        Ok(Outcome::Changed(next)) => next,
        Ok(Outcome::Unchanged) => acc,
        Err(e) => panic!("unexpected reducer error: {}", e),
    })
}

fn card_sets(view: &BoardView) -> Vec<BTreeSet<String>> {
    view.columns
        .iter()
        .map(|c| c.cards.iter().map(|k| k.id.clone()).collect())
        .collect()
}

fn scenario() -> impl Strategy<Value = (Vec<CardPlan>, Vec<BoardOp>)> {
    prop::collection::vec((any::<bool>(), 0usize..3, 0usize..5), 1..12).prop_flat_map(|plans| {
        let shuffled = Just(ops_for(&plans)).prop_shuffle();
        (Just(plans), shuffled)
    })
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn reordered_replay_matches_publish_order((plans, shuffled) in scenario()) {
        let base = base_view(&plans);
        let in_order = replay(&base, &ops_for(&plans));
        let out_of_order = replay(&base, &shuffled);
        prop_assert_eq!(card_sets(&in_order), card_sets(&out_of_order));
        prop_assert_eq!(in_order.card_count(), base.card_count() + plans.iter().filter(|s| s.0).count());
    }

    #[test]
    fn duplicate_delivery_never_duplicates_cards((plans, _shuffled) in scenario()) {
        let base = base_view(&plans);
        let ops = ops_for(&plans);
        let doubled: Vec<BoardOp> = ops.iter().flat_map(|op| [op.clone(), op.clone()]).collect();
        let once = replay(&base, &ops);
        let twice = replay(&base, &doubled);
        prop_assert_eq!(card_sets(&once), card_sets(&twice));

        let mut ids = BTreeSet::new();
        for column in &twice.columns {
            for card in &column.cards {
                prop_assert!(ids.insert(card.id.clone()), "card {} appears twice", card.id);
            }
        }
    }
}
