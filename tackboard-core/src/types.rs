use serde::{Deserialize, Serialize};

/// Visual style tag cycled positionally over the columns of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnStyle {
    #[default]
    Blue,
    Green,
    Orange,
}

impl ColumnStyle {
    const CYCLE: [ColumnStyle; 3] = [ColumnStyle::Blue, ColumnStyle::Green, ColumnStyle::Orange];

    /// Style for the column at `position` (0-based).
    pub fn for_position(position: usize) -> Self {
        Self::CYCLE[position % Self::CYCLE.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Card {
    /// Build a card, trimming title and description.
    /// Returns None when the trimmed title is empty.
    pub fn new(id: impl Into<String>, title: &str, description: Option<&str>) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ToOwned::to_owned);
        Some(Self {
            id: id.into(),
            title: title.to_string(),
            description,
        })
    }

    pub fn has_valid_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// Partial card fields carried by `card_updated`. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub name: String,
    pub cards: Vec<Card>,
    #[serde(default)]
    pub style: ColumnStyle,
}

impl Column {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cards: Vec::new(),
            style: ColumnStyle::for_position(position),
        }
    }

    pub fn card_index(&self, card_id: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }
}

/// The client-side board view: the ordered columns of one board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardView {
    pub columns: Vec<Column>,
}

impl BoardView {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    /// Locate a card anywhere on the board as (column index, card index).
    pub fn find_card(&self, card_id: &str) -> Option<(usize, usize)> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(ci, col)| col.card_index(card_id).map(|ki| (ci, ki)))
    }

    pub fn contains_card(&self, card_id: &str) -> bool {
        self.find_card(card_id).is_some()
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    pub fn column_ids(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }
}
