//! Annotation Controller - binds a player, a channel and a view
//!
//! Coordinates:
//! - Channel join with `last_seen_id` and backlog hand-off
//! - Submits stamped with the player position
//! - Live `new_annotation` events
//! - Seek clicks on rendered annotations
//! - The reveal loop over the join backlog
//!
//! Everything after the join runs in one task. `tokio::select!` serializes
//! reveal ticks, channel events and UI commands, so each handler finishes
//! before the next starts and an annotation can only come out of one path.

use crate::{
    channel::{Channel, ChannelEvent, EventStream, Transport, NEW_ANNOTATION},
    config::WidgetConfig,
    error::{Error, Result},
    player::Player,
    render::{render_annotation, seek_target},
    reveal::RevealQueue,
    session::{ChannelSession, JoinParams},
    types::{Annotation, ControllerState, JoinReply, MediaRef, NewAnnotation},
};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Player shared with the controller task
pub type SharedPlayer = Arc<dyn Player + Send + Sync>;

/// Where rendered annotations go
pub trait AnnotationView: Send + Sync {
    /// Append to the end of the message list and scroll it to the bottom
    fn append(&self, annotation: &Annotation, html: &str);

    /// Empty the annotation input
    fn clear_input(&self);
}

/// One appended list entry
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry {
    pub annotation: Annotation,
    pub html: String,
}

/// View that records what it was asked to show
#[derive(Debug, Default)]
pub struct MemoryView {
    entries: Mutex<Vec<RenderedEntry>>,
    input_clears: Mutex<usize>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<RenderedEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ids in render order
    pub fn rendered_ids(&self) -> Vec<u64> {
        self.entries().iter().map(|e| e.annotation.id).collect()
    }

    pub fn input_clears(&self) -> usize {
        *self.input_clears.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AnnotationView for MemoryView {
    fn append(&self, annotation: &Annotation, html: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RenderedEntry {
                annotation: annotation.clone(),
                html: html.to_string(),
            });
    }

    fn clear_input(&self) {
        *self.input_clears.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}

/// User interaction forwarded to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Submit button with the input's text
    Submit { body: String },
    /// Click in the message list with the seek attribute of the clicked
    /// element and of its parent
    ListClick {
        target: Option<String>,
        parent: Option<String>,
    },
}

/// Controller entry point
pub struct AnnotationController;

impl AnnotationController {
    /// Wire the feed for `root`.
    ///
    /// Returns `Ok(None)` without touching anything when the page has no
    /// widget root. Otherwise connects the transport, awaits the player
    /// bootstrap, joins `<prefix>:<media id>` and starts the feed task. A
    /// rejected or unreadable join is logged and leaves the controller inert;
    /// it is not an error for the caller.
    #[instrument(skip_all, fields(media_id))]
    pub async fn initialize<F, Fut>(
        config: WidgetConfig,
        transport: &dyn Transport,
        root: Option<MediaRef>,
        view: Arc<dyn AnnotationView>,
        bootstrap: F,
    ) -> Result<Option<ControllerHandle>>
    where
        F: FnOnce(MediaRef) -> Fut,
        Fut: Future<Output = Result<SharedPlayer>>,
    {
        let Some(media) = root else {
            debug!("No widget root; skipping");
            return Ok(None);
        };
        config.validate()?;
        tracing::Span::current().record("media_id", media.media_id.as_str());

        let (state_tx, state_rx) = watch::channel(ControllerState::Uninitialized);
        let state = StateCell { tx: state_tx };

        transport.connect().await?;
        state.set(ControllerState::AwaitingPlayerReady)?;

        let media_id = media.media_id.clone();
        let player = bootstrap(media).await?;
        info!(media_id = %media_id, "Player ready");

        let channel: Arc<dyn Channel> = Arc::from(transport.channel(&config.topic_for(&media_id)));
        Self::on_ready(config, player, channel, view, state, state_rx).await
    }

    /// Join the channel and start the feed task
    async fn on_ready(
        config: WidgetConfig,
        player: SharedPlayer,
        channel: Arc<dyn Channel>,
        view: Arc<dyn AnnotationView>,
        state: StateCell,
        state_rx: watch::Receiver<ControllerState>,
    ) -> Result<Option<ControllerHandle>> {
        let session = Arc::new(Mutex::new(ChannelSession::new(channel.topic())));
        let events = channel.events();

        state.set(ControllerState::ChannelJoining)?;
        let params = lock(&session).join_params();
        let backlog = match join_backlog(channel.as_ref(), &params).await {
            Ok(annotations) => {
                lock(&session).acknowledge_backlog(&annotations);
                state.set(ControllerState::Joined)?;
                info!(
                    topic = %channel.topic(),
                    backlog = annotations.len(),
                    "Channel joined"
                );
                Some(annotations)
            }
            Err(e) => {
                warn!(topic = %channel.topic(), error = %e, code = e.error_code(), "Join failed");
                state.set(ControllerState::Inert)?;
                None
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joined = backlog.is_some();
        let feed = Feed {
            period: Duration::from_millis(config.reveal_interval_ms),
            player,
            channel,
            view,
            session: Arc::clone(&session),
            state,
            queue: RevealQueue::new(backlog.unwrap_or_default()),
            joined,
        };
        let events = events.filter(|_| joined);
        let task = tokio::spawn(feed.run(events, command_rx, shutdown_rx));

        Ok(Some(ControllerHandle {
            commands: command_tx,
            shutdown: shutdown_tx,
            state: state_rx,
            session,
            task,
        }))
    }
}

/// Handle on a running feed
///
/// Dropping the handle stops the feed like [`ControllerHandle::shutdown`]
/// without waiting for it.
#[derive(Debug)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<UiEvent>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ControllerState>,
    session: Arc<Mutex<ChannelSession>>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Submit the input's text
    pub fn submit(&self, body: impl Into<String>) {
        self.send(UiEvent::Submit { body: body.into() });
    }

    /// Forward a click in the message list
    pub fn click(&self, target: Option<&str>, parent: Option<&str>) {
        self.send(UiEvent::ListClick {
            target: target.map(str::to_string),
            parent: parent.map(str::to_string),
        });
    }

    /// Forward any UI event
    pub fn send(&self, event: UiEvent) {
        if self.commands.send(event).is_err() {
            debug!("Feed stopped; UI event dropped");
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.clone()
    }

    pub fn last_seen_id(&self) -> Option<u64> {
        lock(&self.session).last_seen_id()
    }

    /// Stop the reveal loop, leave the channel and wait for the task
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| Error::ChannelClosed(format!("feed task failed: {e}")))
    }
}

/// Join and decode the backlog. A reply that does not decode counts as a
/// failed join, and the channel is left again.
async fn join_backlog(channel: &dyn Channel, params: &JoinParams) -> Result<Vec<Annotation>> {
    let response = channel.join(params).await?;
    match serde_json::from_value::<JoinReply>(response) {
        Ok(reply) => Ok(reply.annotations),
        Err(e) => {
            if let Err(leave) = channel.leave().await {
                debug!(error = %leave, "Leave failed");
            }
            Err(e.into())
        }
    }
}

fn lock(session: &Mutex<ChannelSession>) -> std::sync::MutexGuard<'_, ChannelSession> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Validated state holder
struct StateCell {
    tx: watch::Sender<ControllerState>,
}

impl StateCell {
    fn get(&self) -> ControllerState {
        *self.tx.borrow()
    }

    fn set(&self, new_state: ControllerState) -> Result<()> {
        let current = self.get();
        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }
        self.tx.send_replace(new_state);
        info!(from = %current, to = %new_state, "Controller state transition");
        Ok(())
    }
}

/// State owned by the feed task
struct Feed {
    period: Duration,
    player: SharedPlayer,
    channel: Arc<dyn Channel>,
    view: Arc<dyn AnnotationView>,
    session: Arc<Mutex<ChannelSession>>,
    state: StateCell,
    queue: RevealQueue,
    joined: bool,
}

impl Feed {
    async fn run(
        mut self,
        mut events: Option<EventStream>,
        mut commands: mpsc::UnboundedReceiver<UiEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // First reveal one period after the join, like a rescheduled timeout
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick(), if self.joined => self.reveal(),
                event = next_event(&mut events) => match event {
                    Some(event) => self.handle_event(event),
                    None => events = None,
                },
                Some(command) = commands.recv() => self.handle_command(command),
            }
        }

        self.close().await;
    }

    /// Render every backlog annotation playback has reached
    fn reveal(&mut self) {
        let position = self.player.current_time_millis();
        let due = self.queue.tick(position);
        if !due.is_empty() {
            debug!(
                position_ms = position,
                revealed = due.len(),
                pending = self.queue.len(),
                "Revealing backlog"
            );
        }
        for annotation in &due {
            self.render(annotation);
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message { event, payload } if event == NEW_ANNOTATION => {
                match serde_json::from_value::<Annotation>(payload) {
                    Ok(annotation) => {
                        lock(&self.session).acknowledge(&annotation);
                        self.render(&annotation);
                    }
                    Err(e) => warn!(error = %e, "Malformed new_annotation payload"),
                }
            }
            ChannelEvent::Message { event, .. } => {
                debug!(event = %event, "Ignoring channel event");
            }
            ChannelEvent::Closed { reason } => {
                warn!(topic = %self.channel.topic(), reason = %reason, "Channel closed");
            }
        }
    }

    fn handle_command(&mut self, command: UiEvent) {
        match command {
            UiEvent::Submit { body } => self.submit(body),
            UiEvent::ListClick { target, parent } => {
                if let Some(millis) = seek_target(target.as_deref(), parent.as_deref()) {
                    debug!(position_ms = millis, "Seeking to annotation");
                    self.player.seek_to(millis);
                }
            }
        }
    }

    /// Push the annotation and clear the input whatever the outcome
    fn submit(&mut self, body: String) {
        let payload = NewAnnotation {
            body,
            at: self.player.current_time_millis(),
        };
        self.view.clear_input();

        if !self.joined {
            warn!(topic = %self.channel.topic(), "Not joined; annotation dropped");
            return;
        }
        let payload = match serde_json::to_value(&payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Unserializable annotation");
                return;
            }
        };

        let channel = Arc::clone(&self.channel);
        tokio::spawn(async move {
            if let Err(e) = channel.push(NEW_ANNOTATION, payload).await {
                warn!(topic = %channel.topic(), error = %e, code = e.error_code(), "Annotation push failed");
            }
        });
    }

    fn render(&self, annotation: &Annotation) {
        self.view.append(annotation, &render_annotation(annotation));
    }

    async fn close(&mut self) {
        if self.joined {
            if let Err(e) = self.channel.leave().await {
                debug!(error = %e, "Leave failed");
            }
        }
        if let Err(e) = self.state.set(ControllerState::Closed) {
            debug!(error = %e, "Close from unexpected state");
        }
        info!(topic = %self.channel.topic(), pending = self.queue.len(), "Feed stopped");
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Option<ChannelEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryHub;
    use crate::player::SimulatedPlayer;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Server that accepts joins with a reply of the wrong shape
    #[derive(Default)]
    struct GarbledServer {
        pushes: Arc<AtomicUsize>,
        leaves: Arc<AtomicUsize>,
    }

    struct GarbledChannel {
        pushes: Arc<AtomicUsize>,
        leaves: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for GarbledServer {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        fn channel(&self, _topic: &str) -> Box<dyn Channel> {
            Box::new(GarbledChannel {
                pushes: Arc::clone(&self.pushes),
                leaves: Arc::clone(&self.leaves),
            })
        }
    }

    #[async_trait]
    impl Channel for GarbledChannel {
        fn topic(&self) -> &str {
            "videos:1"
        }

        fn events(&self) -> Option<EventStream> {
            None
        }

        async fn join(&self, _params: &JoinParams) -> Result<Value> {
            Ok(json!({"annotations": "oops"}))
        }

        async fn push(&self, _event: &str, _payload: Value) -> Result<Value> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(json!({}))
        }

        async fn leave(&self) -> Result<()> {
            self.leaves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn media() -> MediaRef {
        MediaRef {
            container_id: "video".to_string(),
            player_media_id: "dQw4w9WgXcQ".to_string(),
            media_id: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_noop() {
        let hub = MemoryHub::new("jose");
        let view = Arc::new(MemoryView::new());
        let handle = AnnotationController::initialize(
            WidgetConfig::default(),
            &hub,
            None,
            view,
            |_| async { Ok(Arc::new(SimulatedPlayer::new()) as SharedPlayer) },
        )
        .await
        .unwrap();

        assert!(handle.is_none());
        assert_eq!(hub.connections(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_propagates() {
        let hub = MemoryHub::new("jose");
        let view = Arc::new(MemoryView::new());
        let result = AnnotationController::initialize(
            WidgetConfig::default(),
            &hub,
            Some(media()),
            view,
            |_| async { Err::<SharedPlayer, _>(Error::PlayerUnavailable("script blocked".to_string())) },
        )
        .await;

        assert!(matches!(result, Err(Error::PlayerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_malformed_join_reply_goes_inert() {
        let server = GarbledServer::default();
        let view = Arc::new(MemoryView::new());
        let handle = AnnotationController::initialize(
            WidgetConfig::default(),
            &server,
            Some(media()),
            view.clone(),
            |_| async { Ok(Arc::new(SimulatedPlayer::new()) as SharedPlayer) },
        )
        .await
        .unwrap()
        .expect("widget root present");

        assert_eq!(handle.state(), ControllerState::Inert);
        assert_eq!(handle.last_seen_id(), None);
        assert_eq!(server.leaves.load(Ordering::SeqCst), 1);

        handle.submit("after a bad join");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(server.pushes.load(Ordering::SeqCst), 0);
        assert_eq!(view.input_clears(), 1);
        assert!(view.entries().is_empty());

        handle.shutdown().await.unwrap();
        assert_eq!(server.leaves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_state_cell_rejects_backwards() {
        let (tx, _rx) = watch::channel(ControllerState::Uninitialized);
        let cell = StateCell { tx };
        assert!(cell.set(ControllerState::AwaitingPlayerReady).is_ok());
        assert!(matches!(
            cell.set(ControllerState::Uninitialized),
            Err(Error::InvalidStateTransition { .. })
        ));
        assert_eq!(cell.get(), ControllerState::AwaitingPlayerReady);
    }
}
