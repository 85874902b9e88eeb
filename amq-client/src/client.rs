//! Queue client
//!
//! Ties a session's handler table to the view model, the registries and a command
//! transport. Stream handlers write the shared state; user operations read it, send a
//! command and, for index-based mutations, hold a client-side lock until the server
//! answers that command (or the deadline passes). Unrelated queue payloads replace the
//! mirrored queue but never release a lock.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use amq_common::protocol::{
    AudioStateInfo, EventKey, LoopBounds, NodeHealth, NodeInfo, QueueCause, QueueItem,
    RunningDownloadInfo, StreamEvent,
};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{Acknowledgement, Command, CommandEnvelope, CommandTransport};
use crate::config::{ClientConfig, Timeouts};
use crate::error::{Error, Result};
use crate::guard::{guard, GuardOutcome};
use crate::handlers::HandlerTable;
use crate::registry::{NodeRegistry, SourceRegistry};
use crate::reorder::{ConsiderOutcome, DisplayItem, ReorderCoordinator};
use crate::session::ConnectionStatus;
use crate::view_model::{clamp_progress, QueueViewModel};

/// Notifications for whoever renders the client state
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    QueueReplaced {
        items: Vec<QueueItem>,
        cause: QueueCause,
    },
    PlaybackChanged(AudioStateInfo),
    HealthChanged(NodeHealth),
    NodesChanged(Vec<NodeInfo>),
    SourcesChanged(Vec<String>),
    ActiveSourceChanged(Option<String>),
    DownloadsChanged(RunningDownloadInfo),
    DownloadFailed { url: Option<String>, error: String },
    ConnectionChanged(ConnectionStatus),
    CommandTimedOut { command: &'static str },
    CommandFailed { command: &'static str, error: String },
    ServerError(String),
}

/// A command holding a client-side lock
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub id: Uuid,
    pub command: &'static str,
    pub issued_at: DateTime<Utc>,
    pub deadline: Duration,
}

impl PendingCommand {
    fn new(command: &'static str, deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
            issued_at: Utc::now(),
            deadline,
        }
    }
}

/// How a guarded operation ended, from the caller's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sent, and the server answered before the deadline
    Confirmed,
    /// Sent, but the deadline fired first; the lock is released anyway
    TimedOut,
    /// Nothing was sent
    Skipped,
}

#[derive(Debug, Default)]
struct ClientState {
    view: QueueViewModel,
    reorder: ReorderCoordinator,
    sources: SourceRegistry,
    nodes: NodeRegistry,
    pending_remove: Option<PendingCommand>,
    scrub_generation: u64,
}

/// Client state plus the transport used to change it
pub struct QueueClient<C> {
    transport: Arc<C>,
    state: Arc<RwLock<ClientState>>,
    events: broadcast::Sender<ClientEvent>,
    timeouts: Timeouts,
}

impl<C> Clone for QueueClient<C> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            timeouts: self.timeouts,
        }
    }
}

impl<C: CommandTransport> QueueClient<C> {
    pub fn new(transport: C, config: &ClientConfig) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            transport: Arc::new(transport),
            state: Arc::new(RwLock::new(ClientState::default())),
            events,
            timeouts: config.timeouts,
        }
    }

    /// Subscribe to client events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, ClientState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ClientState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register this client's stream handlers on `table`
    pub fn attach(&self, table: &HandlerTable) {
        let client = self.clone();
        table.on(EventKey::Queue, move |event| {
            if let StreamEvent::Queue { items, cause } = event {
                client.on_queue(items.clone(), *cause);
            }
        });

        let client = self.clone();
        table.on(EventKey::AudioState, move |event| {
            if let StreamEvent::AudioState(state) = event {
                client.write().view.apply_audio_state(state);
                client.broadcast(ClientEvent::PlaybackChanged(state.clone()));
            }
        });

        let client = self.clone();
        table.on(EventKey::Health, move |event| {
            if let StreamEvent::Health(health) = event {
                client.write().view.set_health(health.clone());
                client.broadcast(ClientEvent::HealthChanged(health.clone()));
            }
        });

        let client = self.clone();
        table.on(EventKey::NodeInfo, move |event| {
            if let StreamEvent::NodeInfo(nodes) = event {
                client.write().nodes.replace(nodes.clone());
                client.broadcast(ClientEvent::NodesChanged(nodes.clone()));
            }
        });

        let client = self.clone();
        table.on(EventKey::Downloads, move |event| {
            if let StreamEvent::Downloads(downloads) = event {
                client.on_downloads(downloads.clone());
            }
        });

        let client = self.clone();
        table.on(EventKey::Sources, move |event| {
            if let StreamEvent::Sources(sources) = event {
                client.on_sources(sources.clone());
            }
        });

        let client = self.clone();
        table.on(EventKey::ActiveSource, move |event| {
            if let StreamEvent::ActiveSource(name) = event {
                client.write().sources.apply_active(name.clone());
                client.broadcast(ClientEvent::ActiveSourceChanged(Some(name.clone())));
            }
        });

        let client = self.clone();
        table.on(EventKey::DownloadFinished, move |event| {
            if let StreamEvent::DownloadFinished { error: Some(error) } = event {
                warn!("Download failed: {}", error);
                client.write().view.set_last_error(error.clone());
                client.broadcast(ClientEvent::DownloadFailed {
                    url: None,
                    error: error.clone(),
                });
            }
        });

        let client = self.clone();
        table.on(EventKey::ServerError, move |event| {
            if let StreamEvent::ServerError(message) = event {
                warn!("Server reported: {}", message);
                client.write().view.set_last_error(message.clone());
                client.broadcast(ClientEvent::ServerError(message.clone()));
            }
        });
    }

    fn on_queue(&self, items: Vec<QueueItem>, cause: QueueCause) {
        {
            let mut state = self.write();
            if state.reorder.is_dragging() {
                debug!("Queue replaced mid-drag, aborting gesture");
                state.reorder.abort();
            }
            state.view.replace_queue(items.clone());
        }
        self.broadcast(ClientEvent::QueueReplaced { items, cause });
    }

    fn on_downloads(&self, downloads: RunningDownloadInfo) {
        let fresh = self.write().view.set_downloads(downloads.clone());
        for (url, error) in fresh {
            warn!("Download of {} failed: {}", url, error);
            self.broadcast(ClientEvent::DownloadFailed {
                url: Some(url),
                error,
            });
        }
        self.broadcast(ClientEvent::DownloadsChanged(downloads));
    }

    fn on_sources(&self, sources: Vec<String>) {
        let change = self.write().sources.replace_sources(sources.clone());
        self.broadcast(ClientEvent::SourcesChanged(sources));

        if change.cleared.is_some() && change.auto_activated.is_none() {
            self.broadcast(ClientEvent::ActiveSourceChanged(None));
        }
        if let Some(name) = change.auto_activated {
            self.broadcast(ClientEvent::ActiveSourceChanged(Some(name.clone())));
            // Tell the server too; the local switch already happened
            let client = self.clone();
            tokio::spawn(async move {
                if let Err(e) = client.send(Command::SetActiveSource { name }).await {
                    warn!("Failed to announce auto-activated source: {}", e);
                }
            });
        }
    }

    /// Forward session status changes as `ClientEvent::ConnectionChanged`
    pub fn watch_connection(&self, mut status: watch::Receiver<ConnectionStatus>) {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                let current = *status.borrow_and_update();
                client.broadcast(ClientEvent::ConnectionChanged(current));
                if current == ConnectionStatus::Unknown || status.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    /// Route commands to `name` without a server round trip
    ///
    /// Node streams are addressed by url, so their source is fixed.
    pub fn pin_source(&self, name: &str) {
        self.write().sources.pin(name);
    }

    fn envelope(&self, command: Command) -> CommandEnvelope {
        let source = if let Some(name) = command.source_override() {
            Some(name.to_string())
        } else if command.needs_source() {
            self.read().sources.active().map(str::to_string)
        } else {
            None
        };
        CommandEnvelope::new(command, source)
    }

    /// Send a command without waiting for its effect
    pub async fn send(&self, command: Command) -> Result<()> {
        let name = command.name();
        let envelope = self.envelope(command);
        debug!("Sending {} to {:?}", name, envelope.source_name);
        self.transport.send(envelope).await.map_err(|e| {
            warn!("{} failed: {}", name, e);
            e
        })
    }

    pub async fn play_next(&self) -> Result<()> {
        self.send(Command::PlayNext).await
    }

    pub async fn play_previous(&self) -> Result<()> {
        self.send(Command::PlayPrevious).await
    }

    pub async fn play_selected(&self, index: usize) -> Result<()> {
        self.send(Command::PlaySelected { index }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(Command::UnPause).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetAudioVolume {
            volume: volume.clamp(0.0, 1.0),
        })
        .await
    }

    pub async fn shuffle(&self) -> Result<()> {
        self.send(Command::ShuffleQueue).await
    }

    pub async fn loop_queue(&self, bounds: Option<LoopBounds>) -> Result<()> {
        self.send(Command::LoopQueue { bounds }).await
    }

    /// Queue `url` on `source_name`, or on the active source when `None`
    pub async fn add_queue_item(
        &self,
        title: &str,
        url: &str,
        source_name: Option<&str>,
    ) -> Result<()> {
        self.send(Command::AddQueueItem {
            title: title.to_string(),
            url: url.to_string(),
            source_name: source_name.map(str::to_string),
        })
        .await
    }

    pub async fn read_queue_items(&self) -> Result<()> {
        self.send(Command::ReadQueueItems).await
    }

    pub async fn read_sources(&self) -> Result<()> {
        self.send(Command::ReadSources).await
    }

    /// Ask the server to create a source; usable once it is listed
    pub async fn add_source(&self, name: &str) -> Result<()> {
        self.write().sources.request(name);
        self.send(Command::AddSource {
            name: name.to_string(),
        })
        .await
    }

    /// Ask the server to switch sources; applied when the server confirms
    pub async fn set_active_source(&self, name: &str) -> Result<()> {
        if !self.read().sources.is_usable(name) {
            return Err(Error::invalid_input(format!(
                "source '{name}' is not known to the server"
            )));
        }
        self.send(Command::SetActiveSource {
            name: name.to_string(),
        })
        .await
    }

    /// Remove the item at `index`
    ///
    /// Only one remove may be in flight. Further calls are skipped until the server
    /// answers this remove, the send fails, or the remove deadline passes.
    pub async fn remove_item(&self, index: usize) -> Result<Dispatch> {
        let pending = {
            let mut state = self.write();
            if let Some(pending) = &state.pending_remove {
                debug!("Remove of {} skipped, {} still pending", index, pending.id);
                return Ok(Dispatch::Skipped);
            }
            let pending = PendingCommand::new("remove-queue-item", self.timeouts.remove);
            state.pending_remove = Some(pending.clone());
            pending
        };

        let outcome = self
            .send_acknowledged(
                Command::RemoveQueueItem { index },
                QueueCause::RemoveQueueItem,
                pending.deadline,
                {
                    let client = self.clone();
                    let id = pending.id;
                    move || client.release_remove(id)
                },
            )
            .await;

        self.release_remove(pending.id);
        self.settle(pending.command, outcome)
    }

    fn release_remove(&self, id: Uuid) {
        let mut state = self.write();
        if state.pending_remove.as_ref().map(|p| p.id) == Some(id) {
            state.pending_remove = None;
        }
    }

    /// Remove currently holding the lock
    pub fn pending_remove(&self) -> Option<PendingCommand> {
        self.read().pending_remove.clone()
    }

    /// Feed an intermediate drag order
    pub fn consider_drag(&self, proposed: Vec<DisplayItem>, dragged_id: usize) -> ConsiderOutcome {
        let mut state = self.write();
        let rendered = state.view.rendered().to_vec();
        let outcome = state.reorder.consider(&rendered, proposed, dragged_id);
        if let ConsiderOutcome::Render(order) = &outcome {
            state.view.set_rendered(order.clone());
        }
        outcome
    }

    /// Drop the dragged item; sends at most one move
    pub async fn finalize_drag(&self, order: Vec<DisplayItem>) -> Result<Dispatch> {
        let (params, token) = {
            let mut state = self.write();
            let finalized = state.reorder.finalize(order);
            state.view.set_rendered(finalized.order);
            match finalized.command {
                Some(params) => (params, state.reorder.begin_commit()),
                None => return Ok(Dispatch::Skipped),
            }
        };

        info!("Moving queue item {} -> {}", params.old_pos, params.new_pos);
        let outcome = self
            .send_acknowledged(
                Command::MoveQueueItem(params),
                QueueCause::MoveQueueItem,
                self.timeouts.move_item,
                {
                    let client = self.clone();
                    move || {
                        client.write().reorder.end_commit(token);
                    }
                },
            )
            .await;

        self.write().reorder.end_commit(token);
        self.settle("move-queue-item", outcome)
    }

    pub fn abort_drag(&self) {
        self.write().reorder.abort();
    }

    pub fn is_reorder_locked(&self) -> bool {
        self.read().reorder.is_locked()
    }

    /// Pointer down on the progress bar
    pub fn scrub_press(&self, progress: f64) {
        let mut state = self.write();
        state.scrub_generation += 1;
        state.view.scrub_mut().press(progress);
    }

    pub fn scrub_move(&self, progress: f64) {
        self.write().view.scrub_mut().move_to(progress);
    }

    /// Pointer up: after the grace delay, hand progress back to the server
    ///
    /// A press during the grace delay cancels the pending send.
    pub async fn scrub_release(&self) -> Result<Dispatch> {
        let (generation, progress) = {
            let mut state = self.write();
            if !state.view.scrub().is_user_scrubbing {
                return Ok(Dispatch::Skipped);
            }
            state.scrub_generation += 1;
            (state.scrub_generation, state.view.scrub_mut().release())
        };

        tokio::time::sleep(self.timeouts.scrub_grace).await;

        {
            let mut state = self.write();
            if state.scrub_generation != generation {
                debug!("Scrub release superseded by a new press");
                return Ok(Dispatch::Skipped);
            }
            state.view.scrub_mut().clear_override();
        }

        let envelope = self.envelope(Command::SetAudioProgress {
            progress: clamp_progress(progress),
        });
        let transport = Arc::clone(&self.transport);
        let outcome = guard(
            self.timeouts.progress,
            async move { transport.send(envelope).await },
            || {},
        )
        .await;
        self.settle("set-audio-progress", outcome)
    }

    /// Send `command` and wait for the server's answer to it
    ///
    /// Over a replying transport the settled send is the answer. Otherwise only a queue
    /// payload tagged with `answer` counts.
    async fn send_acknowledged<F>(
        &self,
        command: Command,
        answer: QueueCause,
        deadline: Duration,
        on_timeout: F,
    ) -> GuardOutcome<Result<()>>
    where
        F: FnOnce(),
    {
        let mut updates = self.subscribe();
        let envelope = self.envelope(command);
        let transport = Arc::clone(&self.transport);
        let acknowledgement = transport.acknowledgement();

        let operation = async move {
            transport.send(envelope).await?;
            if acknowledgement == Acknowledgement::Reply {
                return Ok(());
            }
            loop {
                match updates.recv().await {
                    Ok(ClientEvent::QueueReplaced { cause, .. }) if cause == answer => {
                        return Ok(())
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::Internal("client event bus closed".to_string()))
                    }
                }
            }
        };

        guard(deadline, operation, on_timeout).await
    }

    fn settle(&self, command: &'static str, outcome: GuardOutcome<Result<()>>) -> Result<Dispatch> {
        match outcome {
            GuardOutcome::Settled(Ok(())) => Ok(Dispatch::Confirmed),
            GuardOutcome::Settled(Err(e)) => {
                self.broadcast(ClientEvent::CommandFailed {
                    command,
                    error: e.to_string(),
                });
                Err(e)
            }
            GuardOutcome::TimedOut => {
                warn!("{} timed out, releasing lock", command);
                self.broadcast(ClientEvent::CommandTimedOut { command });
                Ok(Dispatch::TimedOut)
            }
            GuardOutcome::Failed(e) => Err(Error::Internal(e)),
        }
    }

    pub fn view(&self) -> QueueViewModel {
        self.read().view.clone()
    }

    pub fn queue(&self) -> Vec<QueueItem> {
        self.read().view.items().to_vec()
    }

    pub fn rendered(&self) -> Vec<DisplayItem> {
        self.read().view.rendered().to_vec()
    }

    pub fn head(&self) -> Option<usize> {
        self.read().view.head()
    }

    pub fn displayed_progress(&self) -> f64 {
        self.read().view.displayed_progress()
    }

    pub fn active_source(&self) -> Option<String> {
        self.read().sources.active().map(str::to_string)
    }

    pub fn sources(&self) -> Vec<String> {
        self.read().sources.sources().to_vec()
    }

    pub fn navigable_nodes(&self) -> Vec<NodeInfo> {
        self.read().nodes.navigable().into_iter().cloned().collect()
    }

    /// Wire name for a node the user picked, refusing poor nodes
    pub fn resolve_node(&self, name: &str) -> Result<String> {
        self.read().nodes.resolve(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amq_common::codec::decode_message;
    use amq_common::protocol::MoveQueueItemParams;
    use std::sync::Mutex;

    /// Records envelopes; answers arrive on the stream unless `ack` says otherwise
    struct RecordingTransport {
        sent: Mutex<Vec<CommandEnvelope>>,
        hang: bool,
        ack: Acknowledgement,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                hang: false,
                ack: Acknowledgement::StreamResponse,
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::new()
            }
        }

        fn replying() -> Self {
            Self {
                ack: Acknowledgement::Reply,
                ..Self::new()
            }
        }
    }

    impl CommandTransport for Arc<RecordingTransport> {
        fn acknowledgement(&self) -> Acknowledgement {
            self.ack
        }

        async fn send(&self, envelope: CommandEnvelope) -> Result<()> {
            self.sent.lock().unwrap().push(envelope);
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn client_with(
        transport: RecordingTransport,
    ) -> (
        QueueClient<Arc<RecordingTransport>>,
        Arc<RecordingTransport>,
        HandlerTable,
    ) {
        let transport = Arc::new(transport);
        let client = QueueClient::new(Arc::clone(&transport), &ClientConfig::default());
        let table = HandlerTable::new();
        client.attach(&table);
        (client, transport, table)
    }

    fn feed(table: &HandlerTable, json: &str) {
        table.dispatch(&decode_message(json).unwrap());
    }

    fn sources_used(transport: &RecordingTransport) -> Vec<Option<String>> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.source_name.clone())
            .collect()
    }

    fn sent(transport: &RecordingTransport) -> Vec<Command> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.command.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_snapshot_then_partial_queue() {
        let (client, _transport, table) = client_with(RecordingTransport::new());

        feed(&table, r#"{"SESSION_CONNECTED_RESPONSE":{"QUEUE":["A","B","C"]}}"#);
        feed(
            &table,
            r#"{"AUDIO_STATE_INFO":{"playbackInfo":{"currentQueueIndex":2},"processorInfo":{"playbackState":"playing","audioProgress":0.2}}}"#,
        );
        assert_eq!(client.head(), Some(2));

        feed(&table, r#"{"QUEUE":["B","C"]}"#);
        let names: Vec<String> = client
            .queue()
            .iter()
            .map(|i| i.display_name().to_string())
            .collect();
        assert_eq!(names, vec!["B", "C"]);
        assert_eq!(client.head(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_remove_is_skipped_while_first_pending() {
        let (client, transport, _table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.remove_item(0).await }
        });
        while client.pending_remove().is_none() {
            tokio::task::yield_now().await;
        }

        assert_eq!(client.remove_item(1).await.unwrap(), Dispatch::Skipped);

        // no queue update arrives, so the deadline releases the lock
        assert_eq!(first.await.unwrap().unwrap(), Dispatch::TimedOut);
        assert!(client.pending_remove().is_none());
        assert_eq!(sent(&transport), vec![Command::RemoveQueueItem { index: 0 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_confirmed_by_queue_update() {
        let (client, _transport, table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");
        feed(&table, r#"{"QUEUE":["A","B"]}"#);

        let removal = tokio::spawn({
            let client = client.clone();
            async move { client.remove_item(0).await }
        });
        while client.pending_remove().is_none() {
            tokio::task::yield_now().await;
        }
        feed(&table, r#"{"REMOVE_QUEUE_ITEM_RESPONSE":{"queue":["B"]}}"#);

        assert_eq!(removal.await.unwrap().unwrap(), Dispatch::Confirmed);
        assert!(client.pending_remove().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_queue_payloads_keep_remove_locked() {
        let (client, transport, table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");
        feed(&table, r#"{"QUEUE":["A","B","C"]}"#);

        let removal = tokio::spawn({
            let client = client.clone();
            async move { client.remove_item(0).await }
        });
        while sent(&transport).is_empty() {
            tokio::task::yield_now().await;
        }

        // another client's add lands before our remove is applied
        feed(&table, r#"{"ADD_QUEUE_ITEM_RESPONSE":{"queue":["A","B","C","D"]}}"#);
        feed(&table, r#"{"QUEUE":["A","B","C","D"]}"#);
        tokio::task::yield_now().await;

        assert_eq!(client.queue().len(), 4);
        assert!(client.pending_remove().is_some());
        assert_eq!(client.remove_item(0).await.unwrap(), Dispatch::Skipped);

        feed(&table, r#"{"REMOVE_QUEUE_ITEM_RESPONSE":{"queue":["B","C","D"]}}"#);
        assert_eq!(removal.await.unwrap().unwrap(), Dispatch::Confirmed);
        assert!(client.pending_remove().is_none());
        assert_eq!(sent(&transport), vec![Command::RemoveQueueItem { index: 0 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replying_transport_settles_on_send() {
        let (client, transport, _table) = client_with(RecordingTransport::replying());
        client.pin_source("kitchen");

        assert_eq!(client.remove_item(1).await.unwrap(), Dispatch::Confirmed);
        assert!(client.pending_remove().is_none());
        assert_eq!(sent(&transport), vec![Command::RemoveQueueItem { index: 1 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_remove_unlocks_at_deadline() {
        let (client, _transport, _table) = client_with(RecordingTransport::hanging());
        client.pin_source("kitchen");
        let mut events = client.subscribe();
        let start = tokio::time::Instant::now();

        assert_eq!(client.remove_item(3).await.unwrap(), Dispatch::TimedOut);
        assert!(start.elapsed() <= Duration::from_millis(3100));
        assert!(client.pending_remove().is_none());

        let mut timed_out = false;
        while let Ok(event) = events.try_recv() {
            if event == (ClientEvent::CommandTimedOut { command: "remove-queue-item" }) {
                timed_out = true;
            }
        }
        assert!(timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_emits_single_move() {
        let (client, transport, table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");
        feed(&table, r#"{"QUEUE":["A","B","C"]}"#);

        let base = client.rendered();
        let step = |ids: &[usize]| ids.iter().map(|id| base[*id].clone()).collect::<Vec<_>>();

        assert!(matches!(client.consider_drag(step(&[0, 2, 1]), 2), ConsiderOutcome::Render(_)));
        assert!(matches!(client.consider_drag(step(&[2, 0, 1]), 2), ConsiderOutcome::Render(_)));
        assert_eq!(client.rendered(), step(&[2, 0, 1]));

        let commit = tokio::spawn({
            let client = client.clone();
            let order = step(&[2, 0, 1]);
            async move { client.finalize_drag(order).await }
        });
        while !client.is_reorder_locked() {
            tokio::task::yield_now().await;
        }
        assert_eq!(client.consider_drag(step(&[1, 0, 2]), 1), ConsiderOutcome::Locked);

        feed(&table, r#"{"QUEUE":["C","A","B"]}"#);
        tokio::task::yield_now().await;
        assert!(client.is_reorder_locked());

        feed(&table, r#"{"MOVE_QUEUE_ITEM_RESPONSE":{"queue":["C","A","B"]}}"#);
        assert_eq!(commit.await.unwrap().unwrap(), Dispatch::Confirmed);
        assert!(!client.is_reorder_locked());

        assert_eq!(
            sent(&transport),
            vec![Command::MoveQueueItem(MoveQueueItemParams {
                old_pos: 2,
                new_pos: 0
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_move_unlocks_at_deadline() {
        let (client, _transport, table) = client_with(RecordingTransport::hanging());
        client.pin_source("kitchen");
        feed(&table, r#"{"QUEUE":["A","B","C"]}"#);
        let mut events = client.subscribe();

        let base = client.rendered();
        let order = vec![base[1].clone(), base[0].clone(), base[2].clone()];
        client.consider_drag(order.clone(), base[1].id);

        let start = tokio::time::Instant::now();
        let commit = tokio::spawn({
            let client = client.clone();
            async move { client.finalize_drag(order).await }
        });
        while !client.is_reorder_locked() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            client.consider_drag(client.rendered(), base[2].id),
            ConsiderOutcome::Locked
        );

        assert_eq!(commit.await.unwrap().unwrap(), Dispatch::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(600));
        assert!(!client.is_reorder_locked());

        let mut timed_out = false;
        while let Ok(event) = events.try_recv() {
            if event == (ClientEvent::CommandTimedOut { command: "move-queue-item" }) {
                timed_out = true;
            }
        }
        assert!(timed_out);
    }

    #[tokio::test]
    async fn test_add_queue_item_can_name_another_source() {
        let (client, transport, _table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");

        client
            .add_queue_item("Song", "https://example.com/a", Some("hall"))
            .await
            .unwrap();
        client
            .add_queue_item("Song", "https://example.com/a", None)
            .await
            .unwrap();

        assert_eq!(
            sources_used(&transport),
            vec![Some("hall".to_string()), Some("kitchen".to_string())]
        );
        assert_eq!(client.active_source().as_deref(), Some("kitchen"));
    }

    #[tokio::test]
    async fn test_queue_snapshot_aborts_drag() {
        let (client, transport, table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");
        feed(&table, r#"{"QUEUE":["A","B","C"]}"#);

        let base = client.rendered();
        client.consider_drag(vec![base[1].clone(), base[0].clone(), base[2].clone()], 0);
        feed(&table, r#"{"QUEUE":["A","B","C","D"]}"#);

        assert_eq!(client.rendered().len(), 4);
        assert_eq!(client.finalize_drag(client.rendered()).await.unwrap(), Dispatch::Skipped);
        assert!(sent(&transport).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrub_release_sends_after_grace() {
        let (client, transport, table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");
        feed(
            &table,
            r#"{"AUDIO_STATE_INFO":{"playbackInfo":{"currentQueueIndex":0},"processorInfo":{"playbackState":"playing","audioProgress":0.1}}}"#,
        );

        client.scrub_press(0.3);
        client.scrub_move(0.6);
        assert_eq!(client.displayed_progress(), 0.6);

        assert_eq!(client.scrub_release().await.unwrap(), Dispatch::Confirmed);
        assert_eq!(sent(&transport), vec![Command::SetAudioProgress { progress: 0.6 }]);
        assert_eq!(client.displayed_progress(), 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_during_grace_cancels_send() {
        let (client, transport, _table) = client_with(RecordingTransport::new());
        client.pin_source("kitchen");

        client.scrub_press(0.4);
        let release = tokio::spawn({
            let client = client.clone();
            async move { client.scrub_release().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.scrub_press(0.9);

        assert_eq!(release.await.unwrap().unwrap(), Dispatch::Skipped);
        assert!(sent(&transport).is_empty());
        assert_eq!(client.displayed_progress(), 0.9);
    }

    #[tokio::test]
    async fn test_single_source_is_auto_activated_and_announced() {
        let (client, transport, table) = client_with(RecordingTransport::new());

        feed(&table, r#"{"SESSION_CONNECTED_RESPONSE":{"SOURCES":["kitchen"]}}"#);
        assert_eq!(client.active_source().as_deref(), Some("kitchen"));

        for _ in 0..10 {
            if !sent(&transport).is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            sent(&transport),
            vec![Command::SetActiveSource {
                name: "kitchen".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_active_source_switches_on_server_confirmation() {
        let (client, _transport, table) = client_with(RecordingTransport::new());
        feed(&table, r#"{"SOURCES":["kitchen","hall"]}"#);
        assert_eq!(client.active_source(), None);

        client.set_active_source("hall").await.unwrap();
        assert_eq!(client.active_source(), None);
        assert!(client.set_active_source("attic").await.is_err());

        feed(&table, r#"{"SET_ACTIVE_SOURCE_RESPONSE":{"sourceName":"hall"}}"#);
        assert_eq!(client.active_source().as_deref(), Some("hall"));
    }

    #[tokio::test]
    async fn test_download_failure_is_broadcast() {
        let (client, _transport, table) = client_with(RecordingTransport::new());
        let mut events = client.subscribe();

        feed(&table, r#"{"FINISHED_DOWNLOADING_AUDIO":{"error":"video unavailable"}}"#);

        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::DownloadFailed {
                url: None,
                error: "video unavailable".into()
            }
        );
        assert_eq!(client.view().last_error(), Some("video unavailable"));
    }
}
