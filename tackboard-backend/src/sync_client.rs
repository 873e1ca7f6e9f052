/// Relay sync client.
///
/// One spawned task owns the board's `SyncAgent` and `ReconciliationStore`.
/// Local edits, relay frames, reconnect timer expiries, authority replies and
/// identity changes all arrive on one command queue and run to completion in
/// arrival order. The SSE reader and the reconnect timer are separate tasks
/// that only post commands back; each carries a generation number so events
/// from a stream or timer that was already replaced are ignored.
///
/// Edits are applied locally first, then published. Publishes go through a
/// single sender task so they leave in edit order; failures are logged and
/// never roll anything back.
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tackboard_core::agent::{encode_op, AgentAction, AgentStatus, Inbound, SyncAgent, TransportError};
use tackboard_core::authority::{AuthorityError, BoardAuthority};
use tackboard_core::config::SyncClientConfig;
use tackboard_core::mapping;
use tackboard_core::reconcile::ReconciliationStore;
use tackboard_core::reducer::BoardOp;
use tackboard_core::sse::SseDecoder;
use tackboard_core::storage::local::FileSlotStore;
use tackboard_core::storage::{MemorySlotStore, SlotStore, StorageError};
use tackboard_core::sync::{BoardUpdate, ClientId, PublishResponse, RelayMessage, CLIENT_ID_HEADER};
use tackboard_core::types::{BoardView, Card, CardPatch, Column};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const LOCAL_CARD_PREFIX: &str = "local-";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slot storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sync client has shut down")]
    Closed,
}

/// A user edit, addressed with this client's column ids.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEdit {
    CreateCard {
        column_id: String,
        title: String,
        description: Option<String>,
    },
    MoveCard {
        card_id: String,
        from_column_id: String,
        to_column_id: String,
        to_index: usize,
    },
    UpdateCard {
        patch: CardPatch,
    },
    ReorderColumn {
        column_id: String,
        to_index: usize,
    },
}

enum StreamEvent {
    Data,
    Frame(RelayMessage),
    Failed(TransportError),
}

enum Command {
    Listen,
    Unlisten,
    SwitchBoard(String),
    Edit(LocalEdit),
    Reload,
    Loaded {
        board_id: String,
        result: Result<Vec<Column>, AuthorityError>,
    },
    CardPersisted {
        board_id: String,
        column_id: String,
        draft: Card,
        result: Result<Card, AuthorityError>,
    },
    Stream {
        generation: u64,
        event: StreamEvent,
    },
    ReconnectTimer {
        generation: u64,
    },
    StreamClosed,
    AuthChanged(bool),
    ForceReconnect,
    Shutdown,
}

struct Outgoing {
    url: String,
    update: BoardUpdate,
}

pub struct SyncClient {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<BoardView>,
    status: watch::Receiver<AgentStatus>,
    client_id: ClientId,
    task: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Start the client task for `board_id`. The view is restored from the
    /// slot mirror immediately and replaced once the authority answers.
    /// The stream only opens while at least one listener exists.
    pub fn spawn<A: BoardAuthority>(
        config: SyncClientConfig,
        board_id: &str,
        authority: Arc<A>,
    ) -> Result<Self, ClientError> {
        let slots: Arc<dyn SlotStore> = match &config.slot_dir {
            Some(dir) => Arc::new(FileSlotStore::new(dir.clone())?),
            None => Arc::new(MemorySlotStore::new()),
        };
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let client_id = ClientId::generate();
        let agent = SyncAgent::new(client_id.clone(), config.reconnect.clone());
        let store = ReconciliationStore::restore(board_id, slots.clone(), config.default_columns);

        let (view_tx, view_rx) = watch::channel(store.view().clone());
        let (status_tx, status_rx) = watch::channel(agent.status());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let outgoing = spawn_publisher(
            http.clone(),
            client_id.clone(),
            Duration::from_secs(config.publish_timeout_secs),
        );

        log::info!(
            target: "tackboard.sync_client",
            "Starting sync client {} for board {}",
            client_id,
            board_id
        );

        let driver = Driver {
            config,
            http,
            authority,
            slots,
            agent,
            store,
            commands: commands_tx.clone(),
            outgoing,
            view_tx,
            status_tx,
            listeners: 0,
            authenticated: true,
            stream: None,
            timer: None,
            generation: 0,
        };
        let task = tokio::spawn(driver.run(commands_rx));

        Ok(Self {
            commands: commands_tx,
            view: view_rx,
            status: status_rx,
            client_id,
            task: Some(task),
        })
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Register a listener; the stream stays open while any listener lives.
    pub fn listen(&self) -> Result<BoardListener, ClientError> {
        self.send(Command::Listen)?;
        Ok(BoardListener {
            view: self.view.clone(),
            commands: self.commands.clone(),
        })
    }

    pub fn edit(&self, edit: LocalEdit) -> Result<(), ClientError> {
        self.send(Command::Edit(edit))
    }

    pub fn switch_board(&self, board_id: &str) -> Result<(), ClientError> {
        self.send(Command::SwitchBoard(board_id.to_string()))
    }

    /// Refetch from the authority and full-replace the view.
    pub fn reload(&self) -> Result<(), ClientError> {
        self.send(Command::Reload)
    }

    /// Identity status. Signing out closes the stream; signing back in
    /// reopens it for the current listeners and resyncs.
    pub fn set_authenticated(&self, authenticated: bool) -> Result<(), ClientError> {
        self.send(Command::AuthChanged(authenticated))
    }

    pub fn force_reconnect(&self) -> Result<(), ClientError> {
        self.send(Command::ForceReconnect)
    }

    pub fn view(&self) -> BoardView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<BoardView> {
        self.view.clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.status.clone()
    }

    /// Stop the client task and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

/// Keeps the subscription alive; dropping it removes the listener.
pub struct BoardListener {
    view: watch::Receiver<BoardView>,
    commands: mpsc::UnboundedSender<Command>,
}

impl BoardListener {
    pub fn snapshot(&self) -> BoardView {
        self.view.borrow().clone()
    }

    /// Wait for the next view change. None once the client has stopped.
    pub async fn changed(&mut self) -> Option<BoardView> {
        self.view.changed().await.ok()?;
        Some(self.view.borrow_and_update().clone())
    }
}

impl Drop for BoardListener {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unlisten);
    }
}

struct Driver<A> {
    config: SyncClientConfig,
    http: reqwest::Client,
    authority: Arc<A>,
    slots: Arc<dyn SlotStore>,
    agent: SyncAgent,
    store: ReconciliationStore,
    commands: mpsc::UnboundedSender<Command>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    view_tx: watch::Sender<BoardView>,
    status_tx: watch::Sender<AgentStatus>,
    listeners: usize,
    authenticated: bool,
    stream: Option<(u64, JoinHandle<()>)>,
    timer: Option<(u64, JoinHandle<()>)>,
    generation: u64,
}

impl<A: BoardAuthority> Driver<A> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.request_reload();
        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
            self.publish_status();
        }
        let actions = self.agent.close();
        self.run_actions(actions);
        log::info!(
            target: "tackboard.sync_client",
            "Sync client {} stopped",
            self.agent.client_id()
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Listen => {
                self.listeners += 1;
                if self.authenticated {
                    let actions = self.agent.subscribe(self.store.board_id());
                    self.run_actions(actions);
                }
            }
            Command::Unlisten => {
                if self.listeners == 0 {
                    return;
                }
                self.listeners -= 1;
                if self.authenticated {
                    let actions = self.agent.unsubscribe();
                    self.run_actions(actions);
                }
            }
            Command::SwitchBoard(board_id) => self.switch_board(board_id),
            Command::Edit(edit) => self.apply_local(edit),
            Command::Reload => self.request_reload(),
            Command::Loaded { board_id, result } => self.on_loaded(&board_id, result),
            Command::CardPersisted {
                board_id,
                column_id,
                draft,
                result,
            } => self.on_card_persisted(&board_id, column_id, draft, result),
            Command::Stream { generation, event } => {
                if self.stream.as_ref().map(|(g, _)| *g) == Some(generation) {
                    self.on_stream_event(event);
                }
            }
            Command::ReconnectTimer { generation } => {
                if self.timer.as_ref().map(|(g, _)| *g) == Some(generation) {
                    self.timer = None;
                    let actions = self.agent.on_reconnect_timer();
                    self.run_actions(actions);
                }
            }
            Command::StreamClosed => self.agent.on_stream_closed(),
            Command::AuthChanged(authenticated) => self.on_auth_changed(authenticated),
            Command::ForceReconnect => {
                let actions = self.agent.force_reconnect();
                self.run_actions(actions);
            }
            Command::Shutdown => {}
        }
    }

    fn run_actions(&mut self, actions: Vec<AgentAction>) {
        for action in actions {
            match action {
                AgentAction::OpenStream { board_id } => self.open_stream(&board_id),
                AgentAction::CloseStream => self.close_stream(),
                AgentAction::ScheduleReconnect { delay, .. } => self.arm_timer(delay),
                AgentAction::CancelReconnect => {
                    if let Some((_, handle)) = self.timer.take() {
                        handle.abort();
                    }
                }
                AgentAction::Resync => {
                    log::info!(
                        target: "tackboard.sync_client",
                        "Stream reopened, resyncing board {}",
                        self.store.board_id()
                    );
                    self.request_reload();
                }
                AgentAction::GaveUp => log::error!(
                    target: "tackboard.sync_client",
                    "Disconnected from relay for board {}; edits stay local",
                    self.store.board_id()
                ),
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn open_stream(&mut self, board_id: &str) {
        if let Some((_, handle)) = self.stream.take() {
            handle.abort();
        }
        let generation = self.next_generation();
        let url = self.config.subscribe_url(board_id);
        let handle = tokio::spawn(read_stream(
            self.http.clone(),
            url,
            generation,
            self.commands.clone(),
        ));
        self.stream = Some((generation, handle));
    }

    /// Abort the reader and report back once its task is gone.
    fn close_stream(&mut self) {
        let Some((_, handle)) = self.stream.take() else {
            self.agent.on_stream_closed();
            return;
        };
        handle.abort();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let _ = handle.await;
            let _ = commands.send(Command::StreamClosed);
        });
    }

    fn arm_timer(&mut self, delay: Duration) {
        if let Some((_, handle)) = self.timer.take() {
            handle.abort();
        }
        let generation = self.next_generation();
        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::ReconnectTimer { generation });
        });
        self.timer = Some((generation, handle));
    }

    fn on_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Data => {
                let actions = self.agent.on_stream_data();
                self.run_actions(actions);
            }
            StreamEvent::Frame(frame) => self.on_frame(frame),
            StreamEvent::Failed(error) => {
                let actions = self.agent.on_transport_error(&error);
                self.run_actions(actions);
            }
        }
    }

    fn on_frame(&mut self, frame: RelayMessage) {
        match self.agent.handle_frame(frame, self.store.mapping()) {
            Inbound::Apply(op) => match self.store.apply(&op) {
                Ok(true) => self.push_view(),
                Ok(false) => log::debug!(
                    target: "tackboard.sync_client",
                    "Ignored duplicate {} on board {}",
                    op.name(),
                    self.store.board_id()
                ),
                Err(e) => log::warn!(
                    target: "tackboard.sync_client",
                    "Dropped {} on board {}: {}",
                    op.name(),
                    self.store.board_id(),
                    e
                ),
            },
            Inbound::Connected { connected_clients } => log::info!(
                target: "tackboard.sync_client",
                "Joined board {} with {} connected clients",
                self.store.board_id(),
                connected_clients
            ),
            Inbound::Invalid(e) => log::warn!(
                target: "tackboard.sync_client",
                "Ignored malformed update on board {}: {}",
                self.store.board_id(),
                e
            ),
            Inbound::Heartbeat | Inbound::SelfEcho | Inbound::OtherBoard => {}
        }
    }

    fn on_auth_changed(&mut self, authenticated: bool) {
        if authenticated == self.authenticated {
            return;
        }
        self.authenticated = authenticated;
        log::info!(
            target: "tackboard.sync_client",
            "Identity {}",
            if authenticated { "signed in" } else { "signed out" }
        );
        if authenticated {
            let board_id = self.store.board_id().to_string();
            let mut actions = Vec::new();
            for _ in 0..self.listeners {
                actions.extend(self.agent.subscribe(&board_id));
            }
            self.run_actions(actions);
            self.request_reload();
        } else {
            let actions = self.agent.close();
            self.run_actions(actions);
        }
    }

    fn switch_board(&mut self, board_id: String) {
        if board_id == self.store.board_id() {
            return;
        }
        log::info!(
            target: "tackboard.sync_client",
            "Switching from board {} to {}",
            self.store.board_id(),
            board_id
        );
        self.store =
            ReconciliationStore::restore(board_id.clone(), self.slots.clone(), self.config.default_columns);
        self.push_view();
        if self.authenticated && self.listeners > 0 {
            let mut actions = Vec::new();
            for _ in 0..self.listeners {
                actions.extend(self.agent.subscribe(&board_id));
            }
            self.run_actions(actions);
        }
        self.request_reload();
    }

    fn request_reload(&mut self) {
        if !self.authenticated {
            log::debug!(target: "tackboard.sync_client", "Skipping reload while signed out");
            return;
        }
        let board_id = self.store.board_id().to_string();
        let authority = self.authority.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = authority.fetch_columns(&board_id).await;
            let _ = commands.send(Command::Loaded { board_id, result });
        });
    }

    fn on_loaded(&mut self, board_id: &str, result: Result<Vec<Column>, AuthorityError>) {
        if board_id != self.store.board_id() {
            return;
        }
        match result {
            Ok(columns) => match self.store.load_authoritative(columns) {
                Ok(true) => self.push_view(),
                Ok(false) => {}
                Err(e) => log::warn!(
                    target: "tackboard.sync_client",
                    "Rejected authoritative data for board {}: {}",
                    board_id,
                    e
                ),
            },
            Err(e) => log::warn!(
                target: "tackboard.sync_client",
                "Keeping local view of board {}: {}",
                board_id,
                e
            ),
        }
    }

    fn apply_local(&mut self, edit: LocalEdit) {
        match edit {
            LocalEdit::CreateCard {
                column_id,
                title,
                description,
            } => self.create_card(column_id, &title, description.as_deref()),
            LocalEdit::MoveCard {
                card_id,
                from_column_id,
                to_column_id,
                to_index,
            } => {
                let persist = !mapping::is_temporary(&from_column_id)
                    && !mapping::is_temporary(&to_column_id)
                    && !is_local_card(&card_id);
                let op = BoardOp::MoveCard {
                    card_id: card_id.clone(),
                    from_column_id,
                    to_column_id: to_column_id.clone(),
                    to_index,
                };
                if self.commit(op) && persist {
                    let authority = self.authority.clone();
                    tokio::spawn(async move {
                        if let Err(e) = authority.move_card(&card_id, &to_column_id).await {
                            log::warn!(
                                target: "tackboard.sync_client",
                                "Authority did not record move of {}: {}",
                                card_id,
                                e
                            );
                        }
                    });
                }
            }
            LocalEdit::UpdateCard { patch } => {
                let persist = !is_local_card(&patch.id);
                if self.commit(BoardOp::MergeCard {
                    patch: patch.clone(),
                }) && persist
                {
                    let authority = self.authority.clone();
                    tokio::spawn(async move {
                        if let Err(e) = authority.update_card(&patch).await {
                            log::warn!(
                                target: "tackboard.sync_client",
                                "Authority did not record update of {}: {}",
                                patch.id,
                                e
                            );
                        }
                    });
                }
            }
            LocalEdit::ReorderColumn {
                column_id,
                to_index,
            } => {
                self.commit(BoardOp::MoveColumn {
                    column_id,
                    to_index,
                });
            }
        }
    }

    /// Cards in temporary columns only live locally. Elsewhere the authority
    /// assigns the id first; if it fails the card keeps a local id.
    fn create_card(&mut self, column_id: String, title: &str, description: Option<&str>) {
        let Some(draft) = Card::new(local_card_id(), title, description) else {
            log::warn!(target: "tackboard.sync_client", "Ignored card with an empty title");
            return;
        };
        if self.store.view().column(&column_id).is_none() {
            log::warn!(
                target: "tackboard.sync_client",
                "Ignored card for unknown column {}",
                column_id
            );
            return;
        }
        if mapping::is_temporary(&column_id) {
            self.commit(BoardOp::InsertCard {
                column_id,
                index: None,
                card: draft,
            });
            return;
        }

        let board_id = self.store.board_id().to_string();
        let authority = self.authority.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = authority
                .create_card(&column_id, &draft.title, draft.description.as_deref())
                .await;
            let _ = commands.send(Command::CardPersisted {
                board_id,
                column_id,
                draft,
                result,
            });
        });
    }

    fn on_card_persisted(
        &mut self,
        board_id: &str,
        column_id: String,
        draft: Card,
        result: Result<Card, AuthorityError>,
    ) {
        if board_id != self.store.board_id() {
            return;
        }
        let card = match result {
            Ok(card) => card,
            Err(e) => {
                log::warn!(
                    target: "tackboard.sync_client",
                    "Authority did not create card, keeping {}: {}",
                    draft.id,
                    e
                );
                draft
            }
        };
        self.commit(BoardOp::InsertCard {
            column_id,
            index: None,
            card,
        });
    }

    /// Apply locally, then publish. Returns whether the view changed.
    fn commit(&mut self, op: BoardOp) -> bool {
        let before = self.store.view().clone();
        match self.store.apply(&op) {
            Ok(true) => {
                self.push_view();
                if let Some(update) = encode_op(&op, &before, self.store.mapping()) {
                    self.publish(update);
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::warn!(
                    target: "tackboard.sync_client",
                    "Rejected local {} on board {}: {}",
                    op.name(),
                    self.store.board_id(),
                    e
                );
                false
            }
        }
    }

    fn publish(&self, update: BoardUpdate) {
        if !self.authenticated {
            return;
        }
        let outgoing = Outgoing {
            url: self.config.publish_url(self.store.board_id()),
            update,
        };
        if self.outgoing.send(outgoing).is_err() {
            log::warn!(target: "tackboard.sync_client", "Publisher stopped, update not sent");
        }
    }

    fn push_view(&self) {
        self.view_tx.send_replace(self.store.view().clone());
    }

    fn publish_status(&self) {
        let next = self.agent.status();
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl<A> Drop for Driver<A> {
    fn drop(&mut self) {
        for (_, handle) in [self.stream.take(), self.timer.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

fn local_card_id() -> String {
    let id = ClientId::generate();
    format!(
        "{}{}",
        LOCAL_CARD_PREFIX,
        id.as_str().trim_start_matches("client_")
    )
}

fn is_local_card(card_id: &str) -> bool {
    card_id.starts_with(LOCAL_CARD_PREFIX)
}

/// Sends publishes one at a time so they reach the relay in edit order.
fn spawn_publisher(
    http: reqwest::Client,
    client_id: ClientId,
    timeout: Duration,
) -> mpsc::UnboundedSender<Outgoing> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
    tokio::spawn(async move {
        while let Some(Outgoing { url, update }) = rx.recv().await {
            let kind = update.update_type();
            let sent = http
                .post(&url)
                .header(CLIENT_ID_HEADER, client_id.as_str())
                .timeout(timeout)
                .json(&update)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            match sent {
                Ok(response) => match response.json::<PublishResponse>().await {
                    Ok(reply) => log::debug!(
                        target: "tackboard.sync_client",
                        "Published {:?}, reached {} clients",
                        kind,
                        reply.connected_clients
                    ),
                    Err(e) => log::debug!(
                        target: "tackboard.sync_client",
                        "Published {:?}, unreadable reply: {}",
                        kind,
                        e
                    ),
                },
                Err(e) => log::warn!(
                    target: "tackboard.sync_client",
                    "Publish of {:?} failed: {}",
                    kind,
                    e
                ),
            }
        }
    });
    tx
}

/// Read the subscribe stream until it fails or ends, posting every decoded
/// frame back to the client task.
async fn read_stream(
    http: reqwest::Client,
    url: String,
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
) {
    let post = |event: StreamEvent| {
        let _ = commands.send(Command::Stream { generation, event });
    };

    let response = match http
        .get(&url)
        .header("accept", "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            post(StreamEvent::Failed(TransportError::Connect(e.to_string())));
            return;
        }
    };
    if !response.status().is_success() {
        post(StreamEvent::Failed(TransportError::Status(
            response.status().as_u16(),
        )));
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut bytes = std::pin::pin!(response.bytes_stream());
    let mut opened = false;
    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                post(StreamEvent::Failed(TransportError::Dropped(e.to_string())));
                return;
            }
        };
        if !opened {
            opened = true;
            post(StreamEvent::Data);
        }
        let payloads = match decoder.push(&chunk) {
            Ok(payloads) => payloads,
            Err(e) => {
                post(StreamEvent::Failed(e));
                return;
            }
        };
        for payload in payloads {
            match serde_json::from_str::<RelayMessage>(&payload) {
                Ok(frame) => post(StreamEvent::Frame(frame)),
                Err(e) => {
                    post(StreamEvent::Failed(TransportError::MalformedFrame(e.to_string())));
                    return;
                }
            }
        }
    }
    post(StreamEvent::Failed(TransportError::Closed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tackboard_core::agent::{ConnectionPhase, ReconnectPolicy};

    #[derive(Default)]
    struct FakeAuthority {
        columns: Mutex<Vec<Column>>,
        created: Mutex<Vec<String>>,
        moves: Mutex<Vec<(String, String)>>,
        fail_create: bool,
    }

    impl BoardAuthority for FakeAuthority {
        async fn fetch_columns(&self, _board_id: &str) -> Result<Vec<Column>, AuthorityError> {
            Ok(self.columns.lock().unwrap().clone())
        }

        async fn create_card(
            &self,
            column_id: &str,
            title: &str,
            description: Option<&str>,
        ) -> Result<Card, AuthorityError> {
            if self.fail_create {
                return Err(AuthorityError::Unavailable("offline".into()));
            }
            let mut created = self.created.lock().unwrap();
            created.push(column_id.to_string());
            let id = format!("auth-{}", created.len());
            Card::new(id, title, description).ok_or_else(|| AuthorityError::Rejected("title".into()))
        }

        async fn move_card(&self, card_id: &str, column_id: &str) -> Result<(), AuthorityError> {
            self.moves
                .lock()
                .unwrap()
                .push((card_id.to_string(), column_id.to_string()));
            Ok(())
        }

        async fn update_card(&self, _patch: &CardPatch) -> Result<(), AuthorityError> {
            Ok(())
        }
    }

    fn three_columns() -> Vec<Column> {
        let mut a = Column::new("colA-uuid", "To Do", 0);
        a.cards.push(Card::new("c1", "First", None).unwrap());
        vec![
            a,
            Column::new("colB-uuid", "In Progress", 1),
            Column::new("colC-uuid", "Done", 2),
        ]
    }

    fn offline_config() -> SyncClientConfig {
        SyncClientConfig {
            // nothing listens on port 1, so every publish and stream fails fast
            server_url: "http://127.0.0.1:1".into(),
            reconnect: ReconnectPolicy {
                max_attempts: 1,
                base_delay_ms: 10,
                max_delay_ms: 10,
            },
            ..SyncClientConfig::default()
        }
    }

    async fn wait_for_view(client: &SyncClient, pred: impl FnMut(&BoardView) -> bool) -> BoardView {
        let mut rx = client.watch_view();
        let reached = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("view did not reach the expected state")
            .expect("client stopped")
            .clone();
        reached
    }

    async fn wait_for_phase(client: &SyncClient, phase: ConnectionPhase) {
        let mut rx = client.watch_status();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.phase == phase))
            .await
            .expect("phase not reached")
            .expect("client stopped");
    }

    #[tokio::test]
    async fn test_move_applies_locally_without_relay() {
        let authority = Arc::new(FakeAuthority::default());
        *authority.columns.lock().unwrap() = three_columns();
        let client = SyncClient::spawn(offline_config(), "b1", authority.clone()).unwrap();
        wait_for_view(&client, |v| v.columns.len() == 3).await;

        client
            .edit(LocalEdit::MoveCard {
                card_id: "c1".into(),
                from_column_id: "colA-uuid".into(),
                to_column_id: "colB-uuid".into(),
                to_index: 0,
            })
            .unwrap();
        let view = wait_for_view(&client, |v| v.find_card("c1") == Some((1, 0))).await;
        assert_eq!(view.card_count(), 1);

        let recorded = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(m) = authority.moves.lock().unwrap().first().cloned() {
                    return m;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(recorded, ("c1".to_string(), "colB-uuid".to_string()));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_card_in_temporary_column_stays_local() {
        let authority = Arc::new(FakeAuthority::default());
        let client = SyncClient::spawn(offline_config(), "b1", authority.clone()).unwrap();
        wait_for_view(&client, |v| v.columns.len() == 3).await;
        assert_eq!(client.view().columns[0].id, "temp-slot-1");

        client
            .edit(LocalEdit::CreateCard {
                column_id: "temp-slot-1".into(),
                title: "   ".into(),
                description: None,
            })
            .unwrap();
        client
            .edit(LocalEdit::CreateCard {
                column_id: "temp-slot-1".into(),
                title: " Sketch ".into(),
                description: None,
            })
            .unwrap();
        let view = wait_for_view(&client, |v| v.card_count() > 0).await;
        assert_eq!(view.card_count(), 1);
        let card = &view.columns[0].cards[0];
        assert_eq!(card.title, "Sketch");
        assert!(card.id.starts_with(LOCAL_CARD_PREFIX));
        assert!(authority.created.lock().unwrap().is_empty());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_created_card_takes_authority_id() {
        let authority = Arc::new(FakeAuthority::default());
        *authority.columns.lock().unwrap() = three_columns();
        let client = SyncClient::spawn(offline_config(), "b1", authority.clone()).unwrap();
        wait_for_view(&client, |v| v.columns.len() == 3).await;

        client
            .edit(LocalEdit::CreateCard {
                column_id: "colC-uuid".into(),
                title: "Ship it".into(),
                description: Some("today".into()),
            })
            .unwrap();
        let view = wait_for_view(&client, |v| v.contains_card("auth-1")).await;
        assert_eq!(view.find_card("auth-1"), Some((2, 0)));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_create_falls_back_to_local_id() {
        let authority = Arc::new(FakeAuthority {
            fail_create: true,
            ..FakeAuthority::default()
        });
        *authority.columns.lock().unwrap() = three_columns();
        let client = SyncClient::spawn(offline_config(), "b1", authority).unwrap();
        wait_for_view(&client, |v| v.columns.len() == 3).await;

        client
            .edit(LocalEdit::CreateCard {
                column_id: "colB-uuid".into(),
                title: "Offline".into(),
                description: None,
            })
            .unwrap();
        let view = wait_for_view(&client, |v| v.card_count() == 2).await;
        assert!(view.columns[1].cards[0].id.starts_with(LOCAL_CARD_PREFIX));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_relay_gives_up_and_sign_out_closes() {
        let authority = Arc::new(FakeAuthority::default());
        let client = SyncClient::spawn(offline_config(), "b1", authority).unwrap();
        let listener = client.listen().unwrap();
        wait_for_phase(&client, ConnectionPhase::Disconnected).await;
        assert!(!client.status().connected);

        client.set_authenticated(false).unwrap();
        wait_for_phase(&client, ConnectionPhase::Idle).await;
        assert_eq!(client.status().board_id, None);

        drop(listener);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_mirror_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncClientConfig {
            slot_dir: Some(dir.path().to_path_buf()),
            ..offline_config()
        };
        let authority = Arc::new(FakeAuthority::default());
        *authority.columns.lock().unwrap() = three_columns();
        let client = SyncClient::spawn(config.clone(), "b1", authority.clone()).unwrap();
        wait_for_view(&client, |v| v.columns.len() == 3).await;
        client
            .edit(LocalEdit::ReorderColumn {
                column_id: "colC-uuid".into(),
                to_index: 0,
            })
            .unwrap();
        wait_for_view(&client, |v| v.columns.first().is_some_and(|c| c.id == "colC-uuid")).await;
        client.shutdown().await;

        let offline = Arc::new(FakeAuthority::default());
        let restarted = SyncClient::spawn(config, "b1", offline).unwrap();
        let view = restarted.view();
        assert_eq!(
            view.column_ids(),
            vec!["colC-uuid", "colA-uuid", "colB-uuid"]
        );
        assert!(view.contains_card("c1"));
        restarted.shutdown().await;
    }
}
