use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tackboard_core::sync::{
    BoardUpdate, PublishResponse, RelayMessage, CLIENT_ID_HEADER, UNKNOWN_CLIENT,
};

use super::rate_limit::too_many_requests;
use super::{error_response, is_valid_board_id};
use crate::state::AppState;

const INVALID_UPDATE: &str = "Invalid update format";

fn client_id(headers: &HeaderMap) -> &str {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
}

/// Parse `{type, data}`; both keys must be present and the payload must
/// match the update type.
fn parse_update(body: &[u8]) -> Result<BoardUpdate, String> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let has_type = value.get("type").is_some_and(|t| !t.is_null());
    let has_data = value.get("data").is_some_and(|d| !d.is_null());
    if !has_type || !has_data {
        return Err("missing type or data".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Publish endpoint: relays one board update to every open connection of
/// the board, the author included.
pub async fn publish_update(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_valid_board_id(&board_id) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "tackboard.api",
            format!("Invalid board id: {}", board_id),
        );
    }

    if !state.publish_limiter.check(&board_id) {
        log::warn!(
            target: "tackboard.api.rate_limit",
            "Publish rate limit exceeded for board {} (max {}/s)",
            board_id,
            state.publish_limiter.max_per_window()
        );
        return too_many_requests();
    }

    let update = match parse_update(&body) {
        Ok(update) => update,
        Err(e) => {
            log::warn!(target: "tackboard.api", "Rejected update for board {}: {}", board_id, e);
            return error_response(StatusCode::BAD_REQUEST, "tackboard.api", INVALID_UPDATE);
        }
    };

    let client_id = client_id(&headers);
    let update_type = update.update_type();
    let message = match RelayMessage::board_update(&board_id, client_id, update) {
        Ok(message) => message,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "tackboard.api",
                format!("Failed to encode update: {}", e),
            );
        }
    };

    let reached = state.relay.publish(&board_id, &message);
    log::debug!(
        target: "tackboard.api",
        "Relayed {:?} from {} on board {} to {} connections",
        update_type,
        client_id,
        board_id,
        reached
    );

    Json(PublishResponse {
        success: true,
        connected_clients: reached,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_missing_client_header_is_unknown() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_id(&headers), "unknown");
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("client_1_abc"));
        assert_eq!(client_id(&headers), "client_1_abc");
    }

    #[test]
    fn test_parse_update_requires_type_and_data() {
        assert!(parse_update(br#"{"type":"card_moved"}"#).is_err());
        assert!(parse_update(br#"{"data":{}}"#).is_err());
        assert!(parse_update(b"not json").is_err());
        assert!(parse_update(br#"{"type":"card_moved","data":{"cardId":"c1"}}"#).is_err());
        assert!(parse_update(br#"{"type":"card_burned","data":{}}"#).is_err());

        let update = parse_update(
            br#"{"type":"column_reordered","data":{"columnId":"slot-1","fromIndex":0,"toIndex":2}}"#,
        )
        .unwrap();
        assert_eq!(update.update_type(), tackboard_core::sync::UpdateType::ColumnReordered);
    }
}
