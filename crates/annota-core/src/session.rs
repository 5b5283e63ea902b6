//! Channel session - per-topic client state carried on joins
//!
//! The only state is `last_seen_id`, sent as a join parameter so the server
//! can skip annotations this client already rendered when it (re)joins.

use crate::types::Annotation;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Join parameters for a video topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_id: Option<u64>,
}

/// Client-side state of one channel subscription
#[derive(Debug, Clone)]
pub struct ChannelSession {
    topic: String,
    last_seen_id: Option<u64>,
}

impl ChannelSession {
    /// Create a session for a topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            last_seen_id: None,
        }
    }

    /// Resume from a known id
    pub fn with_last_seen_id(mut self, id: Option<u64>) -> Self {
        self.last_seen_id = id;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn last_seen_id(&self) -> Option<u64> {
        self.last_seen_id
    }

    /// Record a live annotation
    pub fn acknowledge(&mut self, annotation: &Annotation) {
        self.last_seen_id = Some(annotation.id);
        debug!(topic = %self.topic, last_seen_id = annotation.id, "Annotation acknowledged");
    }

    /// Record a join backlog. An empty backlog leaves the session unchanged.
    pub fn acknowledge_backlog(&mut self, backlog: &[Annotation]) -> Option<u64> {
        if let Some(max) = backlog.iter().map(|ann| ann.id).max() {
            self.last_seen_id = Some(max);
            debug!(topic = %self.topic, last_seen_id = max, backlog = backlog.len(), "Backlog acknowledged");
        }
        self.last_seen_id
    }

    /// Parameters for the next join
    pub fn join_params(&self) -> JoinParams {
        JoinParams {
            last_seen_id: self.last_seen_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ids: &[u64]) -> Vec<Annotation> {
        ids.iter().map(|&id| Annotation::new(id, "u", "b", 0)).collect()
    }

    #[test]
    fn test_backlog_sets_max_id() {
        let mut session = ChannelSession::new("videos:1");
        assert_eq!(session.acknowledge_backlog(&ids(&[3, 7, 1])), Some(7));
        assert_eq!(session.last_seen_id(), Some(7));
    }

    #[test]
    fn test_empty_backlog_leaves_state_unchanged() {
        let mut session = ChannelSession::new("videos:1");
        assert_eq!(session.acknowledge_backlog(&[]), None);

        let mut resumed = ChannelSession::new("videos:1").with_last_seen_id(Some(12));
        assert_eq!(resumed.acknowledge_backlog(&[]), Some(12));
    }

    #[test]
    fn test_live_annotation_overwrites() {
        let mut session = ChannelSession::new("videos:1");
        session.acknowledge_backlog(&ids(&[3, 7]));
        session.acknowledge(&Annotation::new(9, "u", "b", 0));
        assert_eq!(session.last_seen_id(), Some(9));
    }

    #[test]
    fn test_join_params_serialization() {
        let session = ChannelSession::new("videos:1");
        assert_eq!(serde_json::to_value(session.join_params()).unwrap(), serde_json::json!({}));

        let session = session.with_last_seen_id(Some(4));
        assert_eq!(
            serde_json::to_value(session.join_params()).unwrap(),
            serde_json::json!({"last_seen_id": 4})
        );
    }
}
