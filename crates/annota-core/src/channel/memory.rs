//! In-process channel hub
//!
//! Behaves like the annotation server: a join replies with the stored
//! annotations newer than `last_seen_id` in id order, `new_annotation`
//! pushes are stored under a fresh id and broadcast to every subscriber of
//! the topic, the pusher included.

use super::message::NEW_ANNOTATION;
use super::{Channel, ChannelEvent, EventStream, Transport};
use crate::error::{Error, Result};
use crate::session::JoinParams;
use crate::types::{Annotation, JoinReply, NewAnnotation, User};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Largest backlog returned on join unless the hub is told otherwise
const BACKLOG_LIMIT: usize = 200;

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    annotations: HashMap<String, Vec<Annotation>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<ChannelEvent>>>,
    join_rejection: Option<Value>,
    push_rejection: Option<Value>,
    backlog_limit: Option<usize>,
    connections: usize,
}

impl HubState {
    fn broadcast(&mut self, topic: &str, event: ChannelEvent) {
        if let Some(subscribers) = self.subscribers.get_mut(topic) {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// Shared in-memory server. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
    username: String,
}

impl MemoryHub {
    /// New empty hub; transports created from it post as `username`
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                next_id: 1,
                backlog_limit: Some(BACKLOG_LIMIT),
                ..Default::default()
            })),
            username: username.into(),
        }
    }

    /// Handle on the same hub posting as another user
    pub fn as_user(&self, username: impl Into<String>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            username: username.into(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HubState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Store annotations without broadcasting
    pub fn seed(&self, topic: &str, annotations: impl IntoIterator<Item = Annotation>) {
        self.with_state(|state| {
            let stored = state.annotations.entry(topic.to_string()).or_default();
            for ann in annotations {
                state.next_id = state.next_id.max(ann.id + 1);
                stored.push(ann);
            }
            stored.sort_by_key(|ann| ann.id);
        });
    }

    /// Stored annotations for a topic, in id order
    pub fn annotations(&self, topic: &str) -> Vec<Annotation> {
        self.with_state(|state| state.annotations.get(topic).cloned().unwrap_or_default())
    }

    /// Cap the join backlog at `limit` annotations; `None` returns all of them
    pub fn set_backlog_limit(&self, limit: Option<usize>) {
        self.with_state(|state| state.backlog_limit = limit);
    }

    /// Reject every following join with `reason`
    pub fn reject_joins(&self, reason: Value) {
        self.with_state(|state| state.join_rejection = Some(reason));
    }

    /// Reject every following push with `reason`
    pub fn reject_pushes(&self, reason: Value) {
        self.with_state(|state| state.push_rejection = Some(reason));
    }

    /// Broadcast an annotation as if another client had posted it
    pub fn publish(&self, topic: &str, username: &str, body: &str, at: u64) -> Annotation {
        self.with_state(|state| {
            let ann = Annotation::new(state.next_id, username, body, at);
            state.next_id += 1;
            state
                .annotations
                .entry(topic.to_string())
                .or_default()
                .push(ann.clone());
            state.broadcast(
                topic,
                ChannelEvent::Message {
                    event: NEW_ANNOTATION.to_string(),
                    payload: json!(ann),
                },
            );
            ann
        })
    }

    /// Close a topic for every subscriber
    pub fn close_topic(&self, topic: &str, reason: &str) {
        self.with_state(|state| {
            state.broadcast(
                topic,
                ChannelEvent::Closed {
                    reason: reason.to_string(),
                },
            );
            state.subscribers.remove(topic);
        });
    }

    /// Number of `connect` calls seen
    pub fn connections(&self) -> usize {
        self.with_state(|state| state.connections)
    }

    /// Live subscribers on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.with_state(|state| {
            state
                .subscribers
                .get(topic)
                .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
                .unwrap_or(0)
        })
    }
}

#[async_trait]
impl Transport for MemoryHub {
    async fn connect(&self) -> Result<()> {
        self.with_state(|state| state.connections += 1);
        debug!(user = %self.username, "Memory transport connected");
        Ok(())
    }

    fn channel(&self, topic: &str) -> Box<dyn Channel> {
        let (tx, rx) = mpsc::unbounded_channel();
        Box::new(MemoryChannel {
            hub: self.clone(),
            topic: topic.to_string(),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

/// Channel handle on a [`MemoryHub`]
#[derive(Debug)]
pub struct MemoryChannel {
    hub: MemoryHub,
    topic: String,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    rx: Mutex<Option<EventStream>>,
}

#[async_trait]
impl Channel for MemoryChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn events(&self) -> Option<EventStream> {
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    async fn join(&self, params: &JoinParams) -> Result<Value> {
        let topic = self.topic.clone();
        let tx = self.tx.clone();
        self.hub.with_state(|state| {
            if let Some(reason) = state.join_rejection.clone() {
                return Err(Error::join_rejected(topic, reason));
            }
            state.subscribers.entry(topic.clone()).or_default().push(tx);

            let limit = state.backlog_limit.unwrap_or(usize::MAX);
            let annotations: Vec<Annotation> = state
                .annotations
                .get(&topic)
                .map(|all| {
                    all.iter()
                        .filter(|ann| params.last_seen_id.map_or(true, |since| ann.id > since))
                        .take(limit)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            info!(topic = %topic, backlog = annotations.len(), "Memory channel joined");
            Ok(serde_json::to_value(JoinReply { annotations })?)
        })
    }

    async fn push(&self, event: &str, payload: Value) -> Result<Value> {
        if event != NEW_ANNOTATION {
            return Err(Error::PushRejected {
                event: event.to_string(),
                reason: json!({"reason": "unknown event"}),
            });
        }
        let new: NewAnnotation = serde_json::from_value(payload)?;
        let topic = self.topic.clone();
        let username = self.hub.username.clone();

        self.hub.with_state(|state| {
            if let Some(reason) = state.push_rejection.clone() {
                return Err(Error::PushRejected {
                    event: event.to_string(),
                    reason,
                });
            }
            if new.body.trim().is_empty() {
                return Err(Error::PushRejected {
                    event: event.to_string(),
                    reason: json!({"errors": {"body": ["can't be blank"]}}),
                });
            }

            let ann = Annotation {
                id: state.next_id,
                body: new.body,
                at: new.at,
                user: User { username },
            };
            state.next_id += 1;
            state.annotations.entry(topic.clone()).or_default().push(ann.clone());
            state.broadcast(
                &topic,
                ChannelEvent::Message {
                    event: NEW_ANNOTATION.to_string(),
                    payload: json!(ann),
                },
            );
            Ok(json!({}))
        })
    }

    async fn leave(&self) -> Result<()> {
        let topic = self.topic.clone();
        let tx = self.tx.clone();
        self.hub.with_state(|state| {
            if let Some(subscribers) = state.subscribers.get_mut(&topic) {
                subscribers.retain(|sub| !sub.same_channel(&tx));
            }
        });
        debug!(topic = %self.topic, "Memory channel left");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_filters_by_last_seen_id() {
        let hub = MemoryHub::new("jose");
        hub.seed(
            "videos:1",
            vec![
                Annotation::new(1, "a", "one", 100),
                Annotation::new(2, "b", "two", 200),
                Annotation::new(3, "c", "three", 300),
            ],
        );

        let channel = hub.channel("videos:1");
        let reply = channel
            .join(&JoinParams {
                last_seen_id: Some(1),
            })
            .await
            .unwrap();
        let reply: JoinReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.annotations.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_first_join_includes_id_zero() {
        let hub = MemoryHub::new("jose");
        hub.seed(
            "videos:1",
            vec![Annotation::new(0, "a", "zero", 0), Annotation::new(1, "b", "one", 0)],
        );

        let reply = hub.channel("videos:1").join(&JoinParams::default()).await.unwrap();
        let reply: JoinReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.annotations.iter().map(|a| a.id).collect::<Vec<_>>(), vec![0, 1]);

        let reply = hub
            .channel("videos:1")
            .join(&JoinParams {
                last_seen_id: Some(0),
            })
            .await
            .unwrap();
        let reply: JoinReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.annotations.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_backlog_limit() {
        let hub = MemoryHub::new("jose");
        hub.seed(
            "videos:1",
            (1..=201).map(|id| Annotation::new(id, "a", "x", 0)),
        );

        let reply = hub.channel("videos:1").join(&JoinParams::default()).await.unwrap();
        let reply: JoinReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.annotations.len(), BACKLOG_LIMIT);
        assert_eq!(reply.annotations.last().map(|a| a.id), Some(200));

        hub.set_backlog_limit(None);
        let reply = hub.channel("videos:1").join(&JoinParams::default()).await.unwrap();
        let reply: JoinReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.annotations.len(), 201);
    }

    #[tokio::test]
    async fn test_push_broadcasts_to_subscribers() {
        let hub = MemoryHub::new("jose");
        let watcher = hub.as_user("maria").channel("videos:1");
        let mut events = watcher.events().unwrap();
        watcher.join(&JoinParams::default()).await.unwrap();

        let poster = hub.channel("videos:1");
        poster.join(&JoinParams::default()).await.unwrap();
        poster
            .push(NEW_ANNOTATION, json!({"body": "first", "at": 1200}))
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            ChannelEvent::Message { event, payload } => {
                assert_eq!(event, NEW_ANNOTATION);
                let ann: Annotation = serde_json::from_value(payload).unwrap();
                assert_eq!(ann, Annotation::new(1, "jose", "first", 1200));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(hub.annotations("videos:1").len(), 1);
    }

    #[tokio::test]
    async fn test_blank_body_is_rejected() {
        let hub = MemoryHub::new("jose");
        let channel = hub.channel("videos:1");
        channel.join(&JoinParams::default()).await.unwrap();

        let err = tokio_test::assert_err!(
            channel
                .push(NEW_ANNOTATION, json!({"body": "  ", "at": 0}))
                .await
        );
        assert!(matches!(err, Error::PushRejected { .. }));
        assert!(hub.annotations("videos:1").is_empty());
    }

    #[tokio::test]
    async fn test_events_taken_once() {
        let hub = MemoryHub::new("jose");
        let channel = hub.channel("videos:1");
        assert!(channel.events().is_some());
        assert!(channel.events().is_none());
    }

    #[tokio::test]
    async fn test_leave_unsubscribes() {
        let hub = MemoryHub::new("jose");
        let channel = hub.channel("videos:1");
        channel.join(&JoinParams::default()).await.unwrap();
        assert_eq!(hub.subscriber_count("videos:1"), 1);

        channel.leave().await.unwrap();
        assert_eq!(hub.subscriber_count("videos:1"), 0);
    }
}
