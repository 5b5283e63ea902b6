//! Core types for Annota

use serde::{Deserialize, Serialize};

/// Author of an annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

/// A time-stamped comment tied to a playback position
///
/// Immutable once received. Ordered by arrival for rendering, consumed by
/// `at` during backlog reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Server-assigned id, increasing
    pub id: u64,
    /// Comment text (unescaped)
    pub body: String,
    /// Playback position in milliseconds
    pub at: u64,
    /// Author
    pub user: User,
}

impl Annotation {
    pub fn new(id: u64, username: impl Into<String>, body: impl Into<String>, at: u64) -> Self {
        Self {
            id,
            body: body.into(),
            at,
            user: User {
                username: username.into(),
            },
        }
    }
}

/// Payload pushed by the client for a new annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnnotation {
    pub body: String,
    pub at: u64,
}

/// Successful join reply for a video topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReply {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Identifiers read from the widget's root element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// `id` of the element the player embeds into
    pub container_id: String,
    /// `data-player-id`: media id understood by the embedded player
    pub player_media_id: String,
    /// `data-id`: logical video id used to scope the channel
    pub media_id: String,
}

impl MediaRef {
    /// Build from raw attribute reads.
    ///
    /// Returns `None` when any attribute is missing or blank, in which case
    /// the widget stays uninitialized.
    pub fn from_attributes(
        container_id: Option<String>,
        player_media_id: Option<String>,
        media_id: Option<String>,
    ) -> Option<Self> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Some(Self {
            container_id: non_blank(container_id)?,
            player_media_id: non_blank(player_media_id)?,
            media_id: non_blank(media_id)?,
        })
    }
}

/// Annotation controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    /// Nothing wired yet
    Uninitialized,
    /// Player bootstrap in flight
    AwaitingPlayerReady,
    /// Join sent, waiting for the reply
    ChannelJoining,
    /// Accepting submits, receiving live events, revealing backlog
    Joined,
    /// Join failed; nothing else happens
    Inert,
    /// Torn down
    Closed,
}

impl ControllerState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: ControllerState) -> bool {
        use ControllerState::*;
        matches!(
            (self, target),
            (Uninitialized, AwaitingPlayerReady)
                | (AwaitingPlayerReady, ChannelJoining)
                | (ChannelJoining, Joined)
                | (ChannelJoining, Inert)
                | (Uninitialized, Closed)
                | (AwaitingPlayerReady, Closed)
                | (ChannelJoining, Closed)
                | (Joined, Closed)
                | (Inert, Closed)
        )
    }

    /// True once the feed is live
    pub fn is_joined(&self) -> bool {
        matches!(self, ControllerState::Joined)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Uninitialized => write!(f, "uninitialized"),
            ControllerState::AwaitingPlayerReady => write!(f, "awaiting_player_ready"),
            ControllerState::ChannelJoining => write!(f, "channel_joining"),
            ControllerState::Joined => write!(f, "joined"),
            ControllerState::Inert => write!(f, "inert"),
            ControllerState::Closed => write!(f, "closed"),
        }
    }
}
