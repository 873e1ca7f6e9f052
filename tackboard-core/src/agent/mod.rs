/// Client sync agent: the per-board subscription state machine.
///
/// Phases:
///   Idle -> Connecting -> Open -> (Closing | Erroring) -> Idle
///   Erroring -> Connecting after the backoff delay
///   Erroring -> Disconnected once the retry budget is spent
///
/// The agent performs no I/O. Each input returns the actions the host must
/// carry out (open or close the stream, arm or cancel the reconnect timer,
/// refetch authoritative data), which keeps timers and sockets in one task
/// and the transitions testable without a network.
pub mod backoff;

use serde::Serialize;

use crate::mapping::IdentifierMapping;
use crate::reducer::BoardOp;
use crate::sync::{
    BoardUpdate, CardCreated, CardMoved, CardUpdated, ClientId, ColumnReordered, RelayMessage,
};
use crate::types::BoardView;

pub use backoff::{BackoffPolicy, ReconnectPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Open,
    Closing,
    Erroring,
    /// Retries exhausted. Left only by a new subscribe or a forced reconnect.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open stream: {0}")]
    Connect(String),

    #[error("Relay answered with status {0}")]
    Status(u16),

    #[error("Stream dropped: {0}")]
    Dropped(String),

    #[error("Stream ended")]
    Closed,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    OpenStream { board_id: String },
    CloseStream,
    ScheduleReconnect { delay: std::time::Duration, attempt: u32 },
    CancelReconnect,
    /// Refetch authoritative data and full-replace the view.
    Resync,
    /// Retries exhausted; surface a non-blocking disconnected indicator.
    GaveUp,
}

/// What an inbound relay frame means for the local store.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Apply(BoardOp),
    Connected { connected_clients: usize },
    Heartbeat,
    /// Authored by this client; already applied optimistically.
    SelfEcho,
    /// Addressed to a board this agent is not subscribed to.
    OtherBoard,
    /// Payload did not match its update type.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub connected: bool,
    pub phase: ConnectionPhase,
    pub board_id: Option<String>,
    pub client_id: String,
    pub reconnect_attempts: u32,
}

pub struct SyncAgent {
    client_id: ClientId,
    policy: ReconnectPolicy,
    phase: ConnectionPhase,
    board_id: Option<String>,
    listeners: usize,
    attempts: u32,
    reconnect_pending: bool,
    /// Set when the stream was lost; the next Open triggers a resync.
    needs_resync: bool,
}

impl SyncAgent {
    pub fn new(client_id: ClientId, policy: ReconnectPolicy) -> Self {
        Self {
            client_id,
            policy,
            phase: ConnectionPhase::Idle,
            board_id: None,
            listeners: 0,
            attempts: 0,
            reconnect_pending: false,
            needs_resync: false,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn listeners(&self) -> usize {
        self.listeners
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            connected: self.phase == ConnectionPhase::Open,
            phase: self.phase,
            board_id: self.board_id.clone(),
            client_id: self.client_id.to_string(),
            reconnect_attempts: self.attempts,
        }
    }

    /// Add a listener for `board_id`. Connects when nothing is active, and
    /// cancels then resubscribes when the board changes.
    pub fn subscribe(&mut self, board_id: &str) -> Vec<AgentAction> {
        let mut actions = Vec::new();
        let same_board = self.board_id.as_deref() == Some(board_id);
        if !same_board {
            actions.extend(self.teardown());
            self.listeners = 0;
        }
        self.listeners += 1;

        let active = matches!(
            self.phase,
            ConnectionPhase::Connecting | ConnectionPhase::Open | ConnectionPhase::Erroring
        );
        if !same_board || !active {
            self.attempts = 0;
            actions.extend(self.connect(board_id.to_string()));
        }
        actions
    }

    /// Remove a listener. The last one tears the subscription down.
    pub fn unsubscribe(&mut self) -> Vec<AgentAction> {
        self.listeners = self.listeners.saturating_sub(1);
        if self.listeners == 0 {
            self.teardown()
        } else {
            Vec::new()
        }
    }

    /// Drop every listener and close, e.g. when the identity signs out.
    pub fn close(&mut self) -> Vec<AgentAction> {
        self.listeners = 0;
        self.teardown()
    }

    /// Reconnect now with a fresh retry budget, also from Disconnected.
    pub fn force_reconnect(&mut self) -> Vec<AgentAction> {
        let Some(board_id) = self.board_id.clone() else {
            return Vec::new();
        };
        let mut actions = self.release();
        self.attempts = 0;
        self.needs_resync = true;
        actions.extend(self.connect(board_id));
        actions
    }

    /// First bytes arrived on the stream.
    pub fn on_stream_data(&mut self) -> Vec<AgentAction> {
        if self.phase != ConnectionPhase::Connecting {
            return Vec::new();
        }
        self.phase = ConnectionPhase::Open;
        self.attempts = 0;
        log::info!(
            target: "tackboard.agent",
            "Sync stream open for board {}",
            self.board_id.as_deref().unwrap_or("?")
        );
        if std::mem::take(&mut self.needs_resync) {
            vec![AgentAction::Resync]
        } else {
            Vec::new()
        }
    }

    pub fn on_transport_error(&mut self, error: &TransportError) -> Vec<AgentAction> {
        if !matches!(self.phase, ConnectionPhase::Connecting | ConnectionPhase::Open) {
            return Vec::new();
        }
        log::warn!(
            target: "tackboard.agent",
            "Sync stream error for board {}: {}",
            self.board_id.as_deref().unwrap_or("?"),
            error
        );
        self.phase = ConnectionPhase::Erroring;
        self.needs_resync = true;
        let mut actions = vec![AgentAction::CloseStream];
        actions.extend(self.schedule_reconnect());
        actions
    }

    /// The reconnect timer fired.
    pub fn on_reconnect_timer(&mut self) -> Vec<AgentAction> {
        if !self.reconnect_pending || self.phase != ConnectionPhase::Erroring {
            return Vec::new();
        }
        self.reconnect_pending = false;
        match self.board_id.clone() {
            Some(board_id) => self.connect(board_id),
            None => Vec::new(),
        }
    }

    /// Interpret one relay frame against the current identifier mapping.
    pub fn handle_frame(&self, frame: RelayMessage, mapping: &IdentifierMapping) -> Inbound {
        match frame {
            RelayMessage::Connected {
                connected_clients, ..
            } => Inbound::Connected { connected_clients },
            RelayMessage::Heartbeat { .. } => Inbound::Heartbeat,
            RelayMessage::BoardUpdate {
                board_id,
                update_type,
                data,
                client_id,
                ..
            } => {
                if self.board_id.as_deref() != Some(board_id.as_str()) {
                    return Inbound::OtherBoard;
                }
                if client_id == self.client_id.as_str() {
                    return Inbound::SelfEcho;
                }
                match BoardUpdate::from_parts(update_type, data) {
                    Ok(update) => Inbound::Apply(decode_update(update, mapping)),
                    Err(e) => Inbound::Invalid(e.to_string()),
                }
            }
        }
    }

    fn connect(&mut self, board_id: String) -> Vec<AgentAction> {
        self.phase = ConnectionPhase::Connecting;
        self.board_id = Some(board_id.clone());
        log::info!(target: "tackboard.agent", "Connecting sync stream for board {}", board_id);
        vec![AgentAction::OpenStream { board_id }]
    }

    fn schedule_reconnect(&mut self) -> Vec<AgentAction> {
        if self.reconnect_pending {
            return Vec::new();
        }
        if self.attempts >= self.policy.max_attempts {
            log::error!(
                target: "tackboard.agent",
                "Giving up on board {} after {} reconnect attempts",
                self.board_id.as_deref().unwrap_or("?"),
                self.attempts
            );
            self.phase = ConnectionPhase::Disconnected;
            return vec![AgentAction::GaveUp];
        }
        self.attempts += 1;
        self.reconnect_pending = true;
        let delay = self.policy.delay_for_attempt(self.attempts);
        log::info!(
            target: "tackboard.agent",
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            self.attempts,
            self.policy.max_attempts
        );
        vec![AgentAction::ScheduleReconnect {
            delay,
            attempt: self.attempts,
        }]
    }

    /// Close the stream and cancel the timer, keeping the board.
    fn release(&mut self) -> Vec<AgentAction> {
        let mut actions = Vec::new();
        if matches!(self.phase, ConnectionPhase::Connecting | ConnectionPhase::Open) {
            actions.push(AgentAction::CloseStream);
        }
        if std::mem::take(&mut self.reconnect_pending) {
            actions.push(AgentAction::CancelReconnect);
        }
        actions
    }

    /// The host finished releasing a stream closed by `teardown`.
    pub fn on_stream_closed(&mut self) {
        if self.phase == ConnectionPhase::Closing {
            self.phase = ConnectionPhase::Idle;
        }
    }

    /// Drop the board. A live stream leaves the agent in Closing until the
    /// host reports it released; otherwise the agent is Idle right away.
    fn teardown(&mut self) -> Vec<AgentAction> {
        let Some(board_id) = self.board_id.take() else {
            return Vec::new();
        };
        log::info!(target: "tackboard.agent", "Closing sync stream for board {}", board_id);
        let streaming = matches!(
            self.phase,
            ConnectionPhase::Connecting | ConnectionPhase::Open
        );
        let actions = self.release();
        self.attempts = 0;
        self.needs_resync = false;
        self.phase = if streaming {
            ConnectionPhase::Closing
        } else {
            ConnectionPhase::Idle
        };
        actions
    }
}

/// Translate a peer update into a reducer operation, resolving logical
/// column addresses to this client's authority ids.
pub fn decode_update(update: BoardUpdate, mapping: &IdentifierMapping) -> BoardOp {
    match update {
        BoardUpdate::CardCreated(CardCreated { card, column_id }) => BoardOp::InsertCard {
            column_id: mapping.to_authority(&column_id),
            index: None,
            card,
        },
        BoardUpdate::CardMoved(CardMoved {
            card_id,
            from_column_id,
            to_column_id,
            to_index,
        }) => BoardOp::MoveCard {
            card_id,
            from_column_id: mapping.to_authority(&from_column_id),
            to_column_id: mapping.to_authority(&to_column_id),
            to_index,
        },
        BoardUpdate::CardUpdated(CardUpdated { updated_card }) => BoardOp::MergeCard {
            patch: updated_card,
        },
        BoardUpdate::ColumnReordered(ColumnReordered {
            column_id,
            to_index,
            ..
        }) => BoardOp::MoveColumn {
            column_id: mapping.to_authority(&column_id),
            to_index,
        },
    }
}

/// Translate a local operation into the update peers receive, addressing
/// columns logically. `before` is the view the operation was applied to.
/// Full replaces are never broadcast.
pub fn encode_op(op: &BoardOp, before: &BoardView, mapping: &IdentifierMapping) -> Option<BoardUpdate> {
    match op {
        BoardOp::InsertCard {
            column_id, card, ..
        } => Some(BoardUpdate::CardCreated(CardCreated {
            card: card.clone(),
            column_id: mapping.to_logical(column_id),
        })),
        BoardOp::MoveCard {
            card_id,
            from_column_id,
            to_column_id,
            to_index,
        } => Some(BoardUpdate::CardMoved(CardMoved {
            card_id: card_id.clone(),
            from_column_id: mapping.to_logical(from_column_id),
            to_column_id: mapping.to_logical(to_column_id),
            to_index: *to_index,
        })),
        BoardOp::MergeCard { patch } => Some(BoardUpdate::CardUpdated(CardUpdated {
            updated_card: patch.clone(),
        })),
        BoardOp::MoveColumn {
            column_id,
            to_index,
        } => Some(BoardUpdate::ColumnReordered(ColumnReordered {
            column_id: mapping.to_logical(column_id),
            from_index: before.column_index(column_id).unwrap_or(*to_index),
            to_index: *to_index,
        })),
        BoardOp::ReplaceAll { .. } => None,
    }
}
