//! Annota Core - Time-stamped video annotation feed
//!
//! This crate provides the platform-independent pieces of the annotation
//! widget:
//! - Annotation model and controller lifecycle
//! - `MM:SS` time labels and escaped list markup
//! - Reveal queue for backlog annotations
//! - Channel session (`last_seen_id`) and Phoenix frames
//! - Player adapter contract
//!
//! With the default `runtime` feature it also ships a tokio-driven
//! controller, a Phoenix WebSocket client, an in-memory channel hub and a
//! simulated player.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Annota Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │    Player    │  │    Reveal    │  │   Channel    │          │
//! │  │   Adapter    │  │    Queue     │  │   Session    │          │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘          │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │ Annotation  │                              │
//! │                    │ Controller  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐           │
//! │  │   Phoenix    │  │   Render    │  │   Memory     │           │
//! │  │   Socket     │  │  (markup)   │  │    Hub       │           │
//! │  └──────────────┘  └─────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod player;
pub mod render;
pub mod reveal;
pub mod session;
pub mod types;

#[cfg(feature = "runtime")]
pub mod controller;

pub use config::WidgetConfig;
pub use error::{Error, Result};
pub use player::{millis_to_seconds, seconds_to_millis, PlaybackState, Player};
pub use render::{escape_html, format_time, render_annotation, seek_target};
pub use reveal::RevealQueue;
pub use session::{ChannelSession, JoinParams};
pub use types::*;

#[cfg(feature = "runtime")]
pub use channel::{Channel, ChannelEvent, MemoryHub, PhoenixSocket, Transport};
#[cfg(feature = "runtime")]
pub use controller::{AnnotationController, AnnotationView, ControllerHandle, MemoryView, SharedPlayer, UiEvent};
#[cfg(feature = "runtime")]
pub use player::SimulatedPlayer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library startup
pub fn init() {
    tracing::info!(version = VERSION, "Annota Core initialized");
}
