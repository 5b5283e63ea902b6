//! Error types for Annota Core

use thiserror::Error;

/// Result type alias for annotation feed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Annotation feed error types
#[derive(Error, Debug)]
pub enum Error {
    // Page context errors
    #[error("Element not found: #{0}")]
    MissingElement(String),

    #[error("Missing attribute '{attribute}' on #{element}")]
    MissingAttribute { element: String, attribute: String },

    // Player errors
    #[error("Player unavailable: {0}")]
    PlayerUnavailable(String),

    // Channel errors
    #[error("Join rejected on {topic}: {reason}")]
    JoinRejected {
        topic: String,
        reason: serde_json::Value,
    },

    #[error("Push '{event}' rejected: {reason}")]
    PushRejected {
        event: String,
        reason: serde_json::Value,
    },

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Timed out waiting for reply to '{event}'")]
    Timeout { event: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // Controller errors
    #[error("Invalid controller state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "runtime")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[cfg(feature = "runtime")]
    #[error("Invalid socket URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Create a join rejection from any reason payload
    pub fn join_rejected(topic: impl Into<String>, reason: serde_json::Value) -> Self {
        Error::JoinRejected {
            topic: topic.into(),
            reason,
        }
    }

    /// Returns true if this error is recoverable
    ///
    /// Nothing in the feed retries; the flag only tells callers whether the
    /// widget is still usable after the error was logged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PushRejected { .. } | Error::Timeout { .. } | Error::Json(_)
        )
    }

    /// Returns the error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MissingElement(_) => "MISSING_ELEMENT",
            Error::MissingAttribute { .. } => "MISSING_ATTRIBUTE",
            Error::PlayerUnavailable(_) => "PLAYER_UNAVAILABLE",
            Error::JoinRejected { .. } => "JOIN_REJECTED",
            Error::PushRejected { .. } => "PUSH_REJECTED",
            Error::ChannelClosed(_) => "CHANNEL_CLOSED",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Protocol(_) => "PROTOCOL",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            #[cfg(feature = "runtime")]
            Error::WebSocket(_) => "WEBSOCKET",
            #[cfg(feature = "runtime")]
            Error::Url(_) => "URL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_rejection_is_fatal() {
        let err = Error::join_rejected("videos:1", serde_json::json!({"reason": "unauthorized"}));
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "JOIN_REJECTED");
        assert!(err.to_string().contains("videos:1"));
    }

    #[test]
    fn test_push_rejection_is_recoverable() {
        let err = Error::PushRejected {
            event: "new_annotation".to_string(),
            reason: serde_json::json!({"errors": {"body": ["can't be blank"]}}),
        };
        assert!(err.is_recoverable());
    }
}
