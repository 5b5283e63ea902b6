//! Phoenix channel frames (V2 JSON serializer)
//!
//! A frame is the JSON array `[join_ref, ref, topic, event, payload]`.
//! Replies to joins and pushes arrive as `phx_reply` frames whose payload is
//! `{"status": "ok" | "error", "response": ...}`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Annotation event, both directions
pub const NEW_ANNOTATION: &str = "new_annotation";

/// One channel frame
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub join_ref: Option<String>,
    pub msg_ref: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

#[derive(Serialize, Deserialize)]
struct Wire(Option<String>, Option<String>, String, String, Value);

impl Message {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            join_ref: None,
            msg_ref: None,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    pub fn with_refs(mut self, join_ref: Option<String>, msg_ref: Option<String>) -> Self {
        self.join_ref = join_ref;
        self.msg_ref = msg_ref;
        self
    }

    /// Heartbeat frame
    pub fn heartbeat(msg_ref: String) -> Self {
        Self::new(PHOENIX_TOPIC, HEARTBEAT, Value::Object(Default::default()))
            .with_refs(None, Some(msg_ref))
    }

    /// Serialize to the wire array
    pub fn encode(&self) -> Result<String> {
        let wire = Wire(
            self.join_ref.clone(),
            self.msg_ref.clone(),
            self.topic.clone(),
            self.event.clone(),
            self.payload.clone(),
        );
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parse a wire array
    pub fn decode(text: &str) -> Result<Self> {
        let Wire(join_ref, msg_ref, topic, event, payload) = serde_json::from_str(text)?;
        Ok(Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        })
    }

    pub fn is_reply(&self) -> bool {
        self.event == PHX_REPLY
    }

    /// Server closed or crashed the channel
    pub fn is_channel_close(&self) -> bool {
        self.event == PHX_ERROR || self.event == PHX_CLOSE
    }
}

/// Reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Timeout,
}

/// Decoded `phx_reply` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    pub fn ok(response: Value) -> Self {
        Self {
            status: ReplyStatus::Ok,
            response,
        }
    }

    pub fn error(response: Value) -> Self {
        Self {
            status: ReplyStatus::Error,
            response,
        }
    }

    /// Extract the reply from a `phx_reply` frame
    pub fn from_message(message: &Message) -> Result<Self> {
        if !message.is_reply() {
            return Err(Error::Protocol(format!(
                "expected {PHX_REPLY}, got {}",
                message.event
            )));
        }
        Ok(serde_json::from_value(message.payload.clone())?)
    }

    /// `Ok(response)` for an ok reply, the matching rejection otherwise
    pub fn into_result(self, topic: &str, event: &str) -> Result<Value> {
        match self.status {
            ReplyStatus::Ok => Ok(self.response),
            ReplyStatus::Error | ReplyStatus::Timeout if event == PHX_JOIN => {
                Err(Error::join_rejected(topic, self.response))
            }
            ReplyStatus::Error => Err(Error::PushRejected {
                event: event.to_string(),
                reason: self.response,
            }),
            ReplyStatus::Timeout => Err(Error::Timeout {
                event: event.to_string(),
            }),
        }
    }
}
