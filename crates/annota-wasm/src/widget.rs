//! Annotation widget
//!
//! Owns the DOM listeners, the channel callbacks and the reveal timer for
//! one mounted video. Every callback holds a weak reference back to the
//! widget, so dropping or destroying it cuts the page loose.

use crate::log;
use crate::phoenix::{Channel, Socket};
use crate::player::YouTubePlayer;
use annota_core::channel::NEW_ANNOTATION;
use annota_core::render::{render_annotation, seek_target, SEEK_ATTRIBUTE};
use annota_core::{
    Annotation, ChannelSession, ControllerState, Error, JoinReply, MediaRef, NewAnnotation,
    Player, RevealQueue, WidgetConfig,
};
use js_sys::{Function, JSON};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, EventTarget, HtmlInputElement};

type EventClosure = Closure<dyn FnMut(Event)>;
type ReplyClosure = Closure<dyn FnMut(JsValue)>;

fn to_js(err: Error) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn describe(value: &JsValue) -> String {
    JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

// ============================================================================
// DOM plumbing
// ============================================================================

/// Message list, input and submit button
struct Elements {
    container: Element,
    input: HtmlInputElement,
    submit: Element,
}

impl Elements {
    fn find(config: &WidgetConfig) -> Result<Self, Error> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| Error::MissingElement("document".to_string()))?;
        let by_id = |id: &str| {
            document
                .get_element_by_id(id)
                .ok_or_else(|| Error::MissingElement(id.to_string()))
        };
        Ok(Self {
            container: by_id(&config.container_id)?,
            input: by_id(&config.input_id)?
                .dyn_into()
                .map_err(|_| Error::MissingElement(config.input_id.clone()))?,
            submit: by_id(&config.submit_id)?,
        })
    }
}

/// `id`, `data-player-id` and `data-id` of the widget root
fn read_media(root: &Element) -> Result<MediaRef, Error> {
    let read = |attribute: &str| {
        root.get_attribute(attribute)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| Error::MissingAttribute {
                element: root.id(),
                attribute: attribute.to_string(),
            })
    };
    Ok(MediaRef {
        container_id: read("id")?,
        player_media_id: read("data-player-id")?,
        media_id: read("data-id")?,
    })
}

/// Event listener removed from its target on drop
struct Listener {
    target: EventTarget,
    event: &'static str,
    closure: EventClosure,
}

impl Listener {
    fn attach(
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            event,
            closure,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref());
    }
}

/// `setInterval` timer cleared on drop
struct RevealTimer {
    id: i32,
    _tick: Closure<dyn FnMut()>,
}

impl RevealTimer {
    fn start(period_ms: u64, tick: impl FnMut() + 'static) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))?;
        let tick = Closure::wrap(Box::new(tick) as Box<dyn FnMut()>);
        let id = window.set_interval_with_callback_and_timeout_and_arguments_0(
            tick.as_ref().unchecked_ref(),
            i32::try_from(period_ms).unwrap_or(i32::MAX),
        )?;
        Ok(Self { id, _tick: tick })
    }
}

impl Drop for RevealTimer {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_interval_with_handle(self.id);
        }
    }
}

// ============================================================================
// State
// ============================================================================

struct StateCell {
    topic: String,
    state: Cell<ControllerState>,
}

impl StateCell {
    fn new(topic: String) -> Self {
        Self {
            topic,
            state: Cell::new(ControllerState::Uninitialized),
        }
    }

    fn get(&self) -> ControllerState {
        self.state.get()
    }

    fn set(&self, next: ControllerState) -> bool {
        let current = self.state.get();
        if !current.can_transition_to(next) {
            log::warn(&format!("{}: ignoring transition {current} -> {next}", self.topic));
            return false;
        }
        self.state.set(next);
        log::info(&format!("{}: {current} -> {next}", self.topic));
        true
    }
}

// ============================================================================
// Widget
// ============================================================================

struct WidgetInner {
    config: WidgetConfig,
    player: YouTubePlayer,
    channel: Channel,
    elements: Elements,
    session: Rc<RefCell<ChannelSession>>,
    state: StateCell,
    queue: RefCell<RevealQueue>,
    reveal: RefCell<Option<RevealTimer>>,
    listeners: RefCell<Vec<Listener>>,
    replies: RefCell<Vec<ReplyClosure>>,
    message_ref: Cell<Option<f64>>,
    _join_params: Closure<dyn FnMut() -> JsValue>,
}

impl WidgetInner {
    fn wire(self: &Rc<Self>) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        let submit = Listener::attach(&self.elements.submit, "click", move |_event| {
            if let Some(inner) = weak.upgrade() {
                inner.submit();
            }
        })?;

        let weak = Rc::downgrade(self);
        let on_message = Closure::wrap(Box::new(move |payload: JsValue| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(payload);
            }
        }) as Box<dyn FnMut(JsValue)>);
        let reference = self
            .channel
            .on(NEW_ANNOTATION, on_message.as_ref().unchecked_ref());
        self.message_ref.set(Some(reference));

        let weak = Rc::downgrade(self);
        let click = Listener::attach(&self.elements.container, "click", move |event| {
            event.prevent_default();
            if let Some(inner) = weak.upgrade() {
                inner.seek_from(&event);
            }
        })?;

        self.listeners.borrow_mut().extend([submit, click]);
        self.replies.borrow_mut().push(on_message);
        Ok(())
    }

    fn join(self: &Rc<Self>) {
        self.state.set(ControllerState::ChannelJoining);

        let weak = Rc::downgrade(self);
        let on_ok = Closure::wrap(Box::new(move |response: JsValue| {
            if let Some(inner) = weak.upgrade() {
                inner.joined(response);
            }
        }) as Box<dyn FnMut(JsValue)>);

        let weak = Rc::downgrade(self);
        let on_error = Closure::wrap(Box::new(move |reason: JsValue| {
            if let Some(inner) = weak.upgrade() {
                inner.join_failed(&reason);
            }
        }) as Box<dyn FnMut(JsValue)>);

        self.channel
            .join()
            .receive("ok", on_ok.as_ref().unchecked_ref())
            .receive("error", on_error.as_ref().unchecked_ref());
        self.replies.borrow_mut().extend([on_ok, on_error]);
    }

    /// Join replies arrive again on every rejoin with the annotations
    /// posted since `last_seen_id`. A first reply that does not decode
    /// counts as a failed join.
    fn joined(self: &Rc<Self>, response: JsValue) {
        let state = self.state.get();
        if !matches!(state, ControllerState::ChannelJoining | ControllerState::Joined) {
            return;
        }

        let reply: JoinReply = match serde_wasm_bindgen::from_value(response) {
            Ok(reply) => reply,
            Err(err) => {
                log::warn(&format!("{}: unreadable join reply: {err}", self.state.topic));
                if state == ControllerState::ChannelJoining {
                    self.state.set(ControllerState::Inert);
                    self.channel.leave();
                }
                return;
            }
        };
        if state == ControllerState::ChannelJoining {
            self.state.set(ControllerState::Joined);
        }
        self.session.borrow_mut().acknowledge_backlog(&reply.annotations);
        self.queue.borrow_mut().extend(reply.annotations);

        if self.reveal.borrow().is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        match RevealTimer::start(self.config.reveal_interval_ms, move || {
            if let Some(inner) = weak.upgrade() {
                inner.reveal();
            }
        }) {
            Ok(timer) => *self.reveal.borrow_mut() = Some(timer),
            Err(err) => log::error(&format!("unable to start reveal timer: {err:?}")),
        }
    }

    fn join_failed(&self, reason: &JsValue) {
        log::warn(&format!(
            "Unable to join {}: {}",
            self.state.topic,
            describe(reason)
        ));
        if self.state.get() == ControllerState::ChannelJoining {
            self.state.set(ControllerState::Inert);
        }
    }

    fn reveal(&self) {
        let position = self.player.current_time_millis();
        let due = self.queue.borrow_mut().tick(position);
        for annotation in &due {
            self.render(annotation);
        }
    }

    fn receive(&self, payload: JsValue) {
        if !self.state.get().is_joined() {
            return;
        }
        match serde_wasm_bindgen::from_value::<Annotation>(payload) {
            Ok(annotation) => {
                self.session.borrow_mut().acknowledge(&annotation);
                self.render(&annotation);
            }
            Err(err) => log::warn(&format!("malformed {NEW_ANNOTATION}: {err}")),
        }
    }

    fn submit(&self) {
        let body = self.elements.input.value();
        let at = self.player.current_time_millis();
        self.elements.input.set_value("");

        if !self.state.get().is_joined() {
            log::warn(&format!("{}: not joined, dropping annotation", self.state.topic));
            return;
        }

        let payload = match serde_wasm_bindgen::to_value(&NewAnnotation { body, at }) {
            Ok(payload) => payload,
            Err(err) => {
                log::error(&format!("unable to encode annotation: {err}"));
                return;
            }
        };
        let on_error = Closure::once_into_js(|reason: JsValue| {
            log::warn(&format!("annotation rejected: {}", describe(&reason)));
        });
        self.channel
            .push(NEW_ANNOTATION, &payload)
            .receive("error", on_error.unchecked_ref());
    }

    fn seek_from(&self, event: &Event) {
        let target = event.target().and_then(|t| t.dyn_into::<Element>().ok());
        let own = target.as_ref().and_then(|el| el.get_attribute(SEEK_ATTRIBUTE));
        let parent = target
            .as_ref()
            .and_then(|el| el.parent_element())
            .and_then(|el| el.get_attribute(SEEK_ATTRIBUTE));

        if let Some(millis) = seek_target(own.as_deref(), parent.as_deref()) {
            self.player.seek_to(millis);
        }
    }

    fn render(&self, annotation: &Annotation) {
        let Some(document) = self.elements.container.owner_document() else {
            return;
        };
        let entry = match document.create_element("div") {
            Ok(entry) => entry,
            Err(err) => {
                log::error(&format!("unable to create entry: {err:?}"));
                return;
            }
        };
        entry.set_inner_html(&render_annotation(annotation));
        if let Err(err) = self.elements.container.append_child(&entry) {
            log::error(&format!("unable to append entry: {err:?}"));
            return;
        }
        self.elements
            .container
            .set_scroll_top(self.elements.container.scroll_height());
    }

    fn destroy(&self) {
        if self.state.get() == ControllerState::Closed {
            return;
        }
        self.reveal.borrow_mut().take();
        self.listeners.borrow_mut().clear();
        if let Some(reference) = self.message_ref.take() {
            self.channel.off(NEW_ANNOTATION, reference);
        }
        self.channel.leave();
        self.state.set(ControllerState::Closed);
    }
}

/// Mounted annotation widget
#[wasm_bindgen]
pub struct AnnotationWidget {
    inner: Rc<WidgetInner>,
}

impl AnnotationWidget {
    /// Mount on `root`.
    ///
    /// Returns `Ok(None)` when `root` is absent, lacks one of `id`,
    /// `data-player-id` or `data-id`, or the message elements are missing.
    pub async fn mount(
        socket: JsValue,
        root: Option<Element>,
        config: JsValue,
    ) -> Result<Option<Self>, JsValue> {
        let Some(root) = root else {
            return Ok(None);
        };

        let config: WidgetConfig = if config.is_undefined() || config.is_null() {
            WidgetConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        config.validate().map_err(to_js)?;

        let found = read_media(&root).and_then(|media| Ok((media, Elements::find(&config)?)));
        let (media, elements) = match found {
            Ok(found) => found,
            Err(err) => {
                log::warn(&format!("{err}; widget not mounted"));
                return Ok(None);
            }
        };

        let topic = config.topic_for(&media.media_id);
        let state = StateCell::new(topic.clone());
        let socket: Socket = socket.unchecked_into();
        socket.connect();

        state.set(ControllerState::AwaitingPlayerReady);
        let player = YouTubePlayer::create(&config, &media).await?;

        let session = Rc::new(RefCell::new(ChannelSession::new(topic.clone())));
        let params_session = Rc::clone(&session);
        let join_params = Closure::wrap(Box::new(move || {
            serde_wasm_bindgen::to_value(&params_session.borrow().join_params())
                .unwrap_or(JsValue::UNDEFINED)
        }) as Box<dyn FnMut() -> JsValue>);
        let channel = socket.channel(&topic, join_params.as_ref());

        let inner = Rc::new(WidgetInner {
            config,
            player,
            channel,
            elements,
            session,
            state,
            queue: RefCell::new(RevealQueue::default()),
            reveal: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            replies: RefCell::new(Vec::new()),
            message_ref: Cell::new(None),
            _join_params: join_params,
        });
        inner.wire()?;
        inner.join();

        Ok(Some(Self { inner }))
    }
}

#[wasm_bindgen]
impl AnnotationWidget {
    /// Stop the reveal timer, remove listeners and leave the channel
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Lifecycle state name
    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.inner.state.get().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn topic(&self) -> String {
        self.inner.state.topic.clone()
    }

    /// Highest annotation id seen, if any
    #[wasm_bindgen(getter, js_name = lastSeenId)]
    pub fn last_seen_id(&self) -> Option<f64> {
        self.inner.session.borrow().last_seen_id().map(|id| id as f64)
    }

    /// Number of backlog annotations waiting to be revealed
    #[wasm_bindgen(getter, js_name = pendingCount)]
    pub fn pending_count(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Player position in milliseconds
    #[wasm_bindgen(js_name = currentTime)]
    pub fn current_time(&self) -> f64 {
        self.inner.player.current_time_millis() as f64
    }

    #[wasm_bindgen(js_name = seekTo)]
    pub fn seek_to(&self, millis: f64) {
        self.inner.player.seek_to(millis.max(0.0) as u64);
    }

    /// Called with the numeric YouTube state on each playback change
    #[wasm_bindgen(js_name = onStateChange)]
    pub fn on_state_change(&self, handler: Option<Function>) {
        self.inner.player.set_state_handler(handler);
    }

    /// Last playback state code reported by the player
    #[wasm_bindgen(getter, js_name = playbackState)]
    pub fn playback_state(&self) -> Option<i32> {
        self.inner.player.state().map(|state| state.code())
    }
}

impl Drop for AnnotationWidget {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}
