//! Player adapter contract
//!
//! Embeddable players report position in fractional seconds; the feed works
//! in integer milliseconds. Adapters convert at the boundary with
//! [`seconds_to_millis`] and [`millis_to_seconds`].

use serde::{Deserialize, Serialize};

#[cfg(feature = "runtime")]
mod simulated;

#[cfg(feature = "runtime")]
pub use simulated::SimulatedPlayer;

/// Playback state reported by the embedded player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlaybackState {
    /// Decode the embed API's integer state code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(PlaybackState::Unstarted),
            0 => Some(PlaybackState::Ended),
            1 => Some(PlaybackState::Playing),
            2 => Some(PlaybackState::Paused),
            3 => Some(PlaybackState::Buffering),
            5 => Some(PlaybackState::Cued),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            PlaybackState::Unstarted => -1,
            PlaybackState::Ended => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
            PlaybackState::Buffering => 3,
            PlaybackState::Cued => 5,
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Unstarted => write!(f, "unstarted"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Cued => write!(f, "cued"),
        }
    }
}

/// A constructed, ready player
pub trait Player {
    /// Current position in whole milliseconds, floored
    fn current_time_millis(&self) -> u64;

    /// Seek to a position in milliseconds. Fire-and-forget.
    fn seek_to(&self, millis: u64);

    /// Called on every playback state transition. No-op by default.
    fn on_state_change(&self, _state: PlaybackState) {}
}

/// Convert a reported position in seconds to floored milliseconds.
///
/// Negative and non-finite readings map to 0.
pub fn seconds_to_millis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).floor() as u64
}

/// Convert milliseconds to the seconds a player seek expects
pub fn millis_to_seconds(millis: u64) -> f64 {
    millis as f64 / 1000.0
}
