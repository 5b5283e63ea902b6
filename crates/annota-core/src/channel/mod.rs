//! Real-time channel abstraction
//!
//! A transport is a persistent connection; a channel is one topic on it with
//! join, push and subscribe semantics. [`message`] is the Phoenix wire
//! format and has no runtime requirements. With the `runtime` feature the
//! module also provides:
//! - [`PhoenixSocket`]: WebSocket client speaking the Phoenix V2 protocol
//! - [`MemoryHub`]: in-process server for tests and offline replay

pub mod message;

#[cfg(feature = "runtime")]
mod memory;
#[cfg(feature = "runtime")]
mod phoenix;

#[cfg(feature = "runtime")]
pub use memory::{MemoryChannel, MemoryHub};
#[cfg(feature = "runtime")]
pub use phoenix::{PhoenixChannel, PhoenixSocket};

pub use message::{Message, Reply, ReplyStatus, NEW_ANNOTATION};

#[cfg(feature = "runtime")]
pub use self::runtime::*;

#[cfg(feature = "runtime")]
mod runtime {
    use crate::error::Result;
    use crate::session::JoinParams;
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::mpsc;

    /// Server-initiated traffic on a joined topic
    #[derive(Debug, Clone, PartialEq)]
    pub enum ChannelEvent {
        /// Broadcast event with its payload
        Message { event: String, payload: Value },
        /// Channel closed by the server or the connection dropped
        Closed { reason: String },
    }

    /// Receiver of [`ChannelEvent`]s for one channel
    pub type EventStream = mpsc::UnboundedReceiver<ChannelEvent>;

    /// Persistent connection carrying channels
    #[async_trait]
    pub trait Transport: Send + Sync {
        /// Open the connection. Must be called before joining.
        async fn connect(&self) -> Result<()>;

        /// Create a channel handle for `topic`
        fn channel(&self, topic: &str) -> Box<dyn Channel>;
    }

    /// One topic on a transport
    #[async_trait]
    pub trait Channel: Send + Sync {
        fn topic(&self) -> &str;

        /// Take the event stream. Only the first call returns a stream.
        ///
        /// Take it before joining so no broadcast slips past.
        fn events(&self) -> Option<EventStream>;

        /// Join the topic; resolves with the ok response
        async fn join(&self, params: &JoinParams) -> Result<Value>;

        /// Push a client event; resolves with the ok response
        async fn push(&self, event: &str, payload: Value) -> Result<Value>;

        /// Leave the topic
        async fn leave(&self) -> Result<()>;
    }
}
