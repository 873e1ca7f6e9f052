/// The authoritative board backend, as seen by the sync client.
///
/// The backend is opaque here: the client only needs a full fetch of the
/// board's columns and acknowledgements for card writes. Implementations
/// wrap whatever query API hosts the board.
use std::future::Future;

use crate::types::{Card, CardPatch, Column};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthorityError {
    #[error("Authority unavailable: {0}")]
    Unavailable(String),

    #[error("Authority rejected the request: {0}")]
    Rejected(String),
}

pub trait BoardAuthority: Send + Sync + 'static {
    /// Ordered columns (with cards) of a board. Empty when nothing is persisted.
    fn fetch_columns(
        &self,
        board_id: &str,
    ) -> impl Future<Output = Result<Vec<Column>, AuthorityError>> + Send;

    /// Persist a new card; the returned card carries the authority id.
    fn create_card(
        &self,
        column_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> impl Future<Output = Result<Card, AuthorityError>> + Send;

    /// Record a card's new column.
    fn move_card(
        &self,
        card_id: &str,
        column_id: &str,
    ) -> impl Future<Output = Result<(), AuthorityError>> + Send;

    fn update_card(&self, patch: &CardPatch) -> impl Future<Output = Result<(), AuthorityError>> + Send;
}
