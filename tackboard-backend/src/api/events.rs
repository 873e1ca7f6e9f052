use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{sse::Event, IntoResponse, Json, Response, Sse},
};
use futures_util::stream::{self, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tackboard_core::sync::RelayMessage;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{error_response, is_valid_board_id};
use crate::relay::{ConnectionId, EventRelay, Frame};
use crate::state::AppState;

/// Unsubscribes its connection when the response stream is dropped.
struct ConnectionGuard {
    relay: Arc<EventRelay>,
    board_id: String,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.relay.unsubscribe(&self.board_id, self.id);
    }
}

struct Feed {
    frames: mpsc::Receiver<Frame>,
    heartbeat: Interval,
    _guard: ConnectionGuard,
}

fn frame_event(message: &RelayMessage) -> Event {
    let json = serde_json::to_string(message).unwrap_or_default();
    Event::default().data(json)
}

/// SSE endpoint: the connected frame first, then board updates and heartbeats
/// until the client goes away or the relay drops the connection.
pub async fn subscribe(State(state): State<AppState>, Path(board_id): Path<String>) -> Response {
    if !is_valid_board_id(&board_id) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "tackboard.api",
            format!("Invalid board id: {}", board_id),
        );
    }

    let connection = state.relay.subscribe(&board_id);
    let connected = RelayMessage::connected(&board_id, state.relay.connection_count(&board_id));

    let period = Duration::from_secs(state.config.heartbeat_secs.max(1));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let feed = Feed {
        frames: connection.frames,
        heartbeat,
        _guard: ConnectionGuard {
            relay: state.relay.clone(),
            board_id: connection.board_id,
            id: connection.id,
        },
    };

    let updates = stream::unfold(feed, |mut feed| async move {
        tokio::select! {
            frame = feed.frames.recv() => {
                frame.map(|frame| (Ok::<_, Infallible>(Event::default().data(frame)), feed))
            }
            _ = feed.heartbeat.tick() => {
                Some((Ok(frame_event(&RelayMessage::heartbeat())), feed))
            }
        }
    });

    let stream = stream::once(async move { Ok(frame_event(&connected)) }).chain(updates);
    Sse::new(stream).into_response()
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "connections": state.relay.total_connections(),
        "boards": state.relay.board_count(),
    }))
}

pub async fn list_logs() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "entries": crate::log_bridge::recent_entries(),
    }))
}
