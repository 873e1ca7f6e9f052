use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;

mod events;
pub mod rate_limit;
mod updates;

use crate::state::AppState;

/// Axum relay routes.
///
///   GET  /api/subscribe/{boardId}       -> SSE stream of relay frames for a board
///   POST /api/boards/{boardId}/updates  -> publish `{type, data}` to a board's subscribers
///   GET  /api/status                    -> health check with connection counts
///   GET  /api/logs                      -> recent in-memory log entries
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/subscribe/{board_id}", get(events::subscribe))
        .route("/api/boards/{board_id}/updates", post(updates::publish_update))
        .route("/api/status", get(events::status))
        .route("/api/logs", get(events::list_logs))
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, target: &'static str, message: impl Into<String>) -> Response {
    let message = message.into();
    log_api_issue(status, target, &message);
    (status, Json(ErrorResponse { error: message })).into_response()
}

/// Board ids are opaque but travel in URLs and log lines.
fn is_valid_board_id(board_id: &str) -> bool {
    !board_id.is_empty()
        && board_id.len() <= 128
        && board_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_id_validation() {
        assert!(is_valid_board_id("b1"));
        assert!(is_valid_board_id("3f2a9c1e-0b7d-4e4a-9a51-2a7a0f1c8e11"));
        assert!(!is_valid_board_id(""));
        assert!(!is_valid_board_id("a b"));
        assert!(!is_valid_board_id(&"x".repeat(129)));
    }
}
