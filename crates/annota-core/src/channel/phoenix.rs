//! Phoenix WebSocket client
//!
//! One socket multiplexes channels. A writer task drains outgoing frames, a
//! reader task routes `phx_reply` frames to the waiting request by ref and
//! everything else to the channel subscribed to the frame's topic, and a
//! heartbeat task keeps the connection alive. There is no reconnect: when
//! the connection drops every channel receives [`ChannelEvent::Closed`].

use super::message::{Message, Reply, PHX_JOIN, PHX_LEAVE};
use super::{Channel, ChannelEvent, EventStream, Transport};
use crate::config::WidgetConfig;
use crate::error::{Error, Result};
use crate::session::JoinParams;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, instrument, warn};
use url::Url;

const PROTOCOL_VERSION: &str = "2.0.0";

#[derive(Debug, Default)]
struct Routes {
    replies: HashMap<String, oneshot::Sender<Reply>>,
    topics: HashMap<String, mpsc::UnboundedSender<ChannelEvent>>,
}

#[derive(Debug)]
struct SocketInner {
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    routes: Mutex<Routes>,
    next_ref: AtomicU64,
    reply_timeout: Duration,
}

impl SocketInner {
    fn make_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, message: Message) -> Result<()> {
        let outgoing = self.outgoing.lock().unwrap_or_else(|e| e.into_inner());
        match outgoing.as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| Error::ChannelClosed("socket writer stopped".to_string())),
            None => Err(Error::ChannelClosed("socket not connected".to_string())),
        }
    }

    /// Send a frame and wait for its reply
    async fn request(
        &self,
        topic: &str,
        event: &str,
        payload: Value,
        join_ref: Option<String>,
    ) -> Result<Value> {
        let msg_ref = self.make_ref();
        let (tx, rx) = oneshot::channel();
        self.routes().replies.insert(msg_ref.clone(), tx);

        let message = Message::new(topic, event, payload).with_refs(join_ref, Some(msg_ref.clone()));
        if let Err(e) = self.send(message) {
            self.routes().replies.remove(&msg_ref);
            return Err(e);
        }

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => reply.into_result(topic, event),
            Ok(Err(_)) => Err(Error::ChannelClosed("connection dropped".to_string())),
            Err(_) => {
                self.routes().replies.remove(&msg_ref);
                Err(Error::Timeout {
                    event: event.to_string(),
                })
            }
        }
    }

    fn dispatch(&self, message: Message) {
        if message.is_reply() {
            let waiter = message
                .msg_ref
                .as_ref()
                .and_then(|r| self.routes().replies.remove(r));
            match (waiter, Reply::from_message(&message)) {
                (Some(tx), Ok(reply)) => {
                    let _ = tx.send(reply);
                }
                (Some(_), Err(e)) => warn!(error = %e, "Malformed reply"),
                // heartbeat and leave replies nobody waits for
                (None, _) => {}
            }
            return;
        }

        let mut routes = self.routes();
        let Some(tx) = routes.topics.get(&message.topic) else {
            debug!(topic = %message.topic, event = %message.event, "Frame for unknown topic");
            return;
        };
        let event = if message.is_channel_close() {
            ChannelEvent::Closed {
                reason: message.event.clone(),
            }
        } else {
            ChannelEvent::Message {
                event: message.event,
                payload: message.payload,
            }
        };
        if tx.send(event).is_err() {
            routes.topics.remove(&message.topic);
        }
    }

    /// Connection is gone: fail pending requests, close every channel
    fn shutdown(&self, reason: &str) {
        self.outgoing.lock().unwrap_or_else(|e| e.into_inner()).take();
        let mut routes = self.routes();
        routes.replies.clear();
        for (_, tx) in routes.topics.drain() {
            let _ = tx.send(ChannelEvent::Closed {
                reason: reason.to_string(),
            });
        }
    }
}

/// WebSocket connection to a Phoenix endpoint
#[derive(Debug, Clone)]
pub struct PhoenixSocket {
    url: Url,
    heartbeat_interval: Duration,
    inner: Arc<SocketInner>,
}

impl PhoenixSocket {
    /// Socket for an endpoint such as `ws://localhost:4000/socket`.
    ///
    /// `/websocket` and `vsn=2.0.0` are appended as the server expects;
    /// extra query parameters (e.g. a token) are kept.
    pub fn new(endpoint: &str, config: &WidgetConfig) -> Result<Self> {
        let mut url = Url::parse(endpoint)?;
        if !url.path().ends_with("/websocket") {
            let path = format!("{}/websocket", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }
        if !url.query_pairs().any(|(k, _)| k == "vsn") {
            url.query_pairs_mut().append_pair("vsn", PROTOCOL_VERSION);
        }

        Ok(Self {
            url,
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            inner: Arc::new(SocketInner {
                outgoing: Mutex::new(None),
                routes: Mutex::new(Routes::default()),
                next_ref: AtomicU64::new(0),
                reply_timeout: Duration::from_millis(config.reply_timeout_ms),
            }),
        })
    }

    /// Resolved endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the writer is still attached
    pub fn is_connected(&self) -> bool {
        self.inner
            .outgoing
            .lock()
            .map(|tx| tx.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for PhoenixSocket {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<()> {
        let (stream, _) = timeout(self.inner.reply_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| Error::Timeout {
                event: "connect".to_string(),
            })??;
        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.inner.outgoing.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        // Writer
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    warn!(error = %e, "Socket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(WsMessage::Text(text))) => match Message::decode(&text) {
                        Ok(message) => inner.dispatch(message),
                        Err(e) => warn!(error = %e, "Undecodable frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break "socket closed".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                }
            };
            info!(reason = %reason, "Socket disconnected");
            inner.shutdown(&reason);
        });

        // Heartbeat
        let inner = Arc::clone(&self.inner);
        let period = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if inner.send(Message::heartbeat(inner.make_ref())).is_err() {
                    break;
                }
            }
        });

        info!("Socket connected");
        Ok(())
    }

    fn channel(&self, topic: &str) -> Box<dyn Channel> {
        let (tx, rx) = mpsc::unbounded_channel();
        Box::new(PhoenixChannel {
            topic: topic.to_string(),
            inner: Arc::clone(&self.inner),
            tx,
            rx: Mutex::new(Some(rx)),
            join_ref: Mutex::new(None),
        })
    }
}

/// One topic on a [`PhoenixSocket`]
#[derive(Debug)]
pub struct PhoenixChannel {
    topic: String,
    inner: Arc<SocketInner>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    rx: Mutex<Option<EventStream>>,
    join_ref: Mutex<Option<String>>,
}

impl PhoenixChannel {
    fn join_ref(&self) -> Option<String> {
        self.join_ref.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Channel for PhoenixChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn events(&self) -> Option<EventStream> {
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    #[instrument(skip(self), fields(topic = %self.topic))]
    async fn join(&self, params: &JoinParams) -> Result<Value> {
        let join_ref = self.inner.make_ref();
        *self.join_ref.lock().unwrap_or_else(|e| e.into_inner()) = Some(join_ref.clone());
        self.inner
            .routes()
            .topics
            .insert(self.topic.clone(), self.tx.clone());

        let payload = serde_json::to_value(params)?;
        let result = self
            .inner
            .request(&self.topic, PHX_JOIN, payload, Some(join_ref))
            .await;
        if result.is_err() {
            self.inner.routes().topics.remove(&self.topic);
        }
        result
    }

    async fn push(&self, event: &str, payload: Value) -> Result<Value> {
        self.inner
            .request(&self.topic, event, payload, self.join_ref())
            .await
    }

    async fn leave(&self) -> Result<()> {
        self.inner.routes().topics.remove(&self.topic);
        let message = Message::new(&self.topic, PHX_LEAVE, Value::Object(Default::default()))
            .with_refs(self.join_ref(), Some(self.inner.make_ref()));
        self.inner.send(message)
    }
}
