//! Simulated player driven by the tokio clock
//!
//! Stands in for an embedded player in headless runs and tests. While
//! playing, the position advances with `tokio::time::Instant`, so paused-time
//! tests move it with `tokio::time::advance`.

use super::{PlaybackState, Player};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Clock {
    /// Position at `anchor`
    base_ms: u64,
    /// Set while playing
    anchor: Option<Instant>,
    rate: f64,
    state: PlaybackState,
    seeks: Vec<u64>,
    transitions: Vec<PlaybackState>,
}

impl Clock {
    fn position(&self) -> u64 {
        match self.anchor {
            Some(anchor) => {
                let elapsed = anchor.elapsed().as_secs_f64() * 1000.0 * self.rate;
                self.base_ms + elapsed.floor() as u64
            }
            None => self.base_ms,
        }
    }

    fn transition(&mut self, state: PlaybackState) -> Option<PlaybackState> {
        if self.state == state {
            return None;
        }
        self.state = state;
        Some(state)
    }
}

/// Clock-driven player
#[derive(Debug)]
pub struct SimulatedPlayer {
    clock: Mutex<Clock>,
}

impl SimulatedPlayer {
    /// New player, paused at 0
    pub fn new() -> Self {
        Self {
            clock: Mutex::new(Clock {
                base_ms: 0,
                anchor: None,
                rate: 1.0,
                state: PlaybackState::Unstarted,
                seeks: Vec::new(),
                transitions: Vec::new(),
            }),
        }
    }

    /// New player already playing at `rate` from 0
    pub fn playing(rate: f64) -> Self {
        let player = Self::new();
        player.set_rate(rate);
        player.play();
        player
    }

    fn with_clock<T>(&self, f: impl FnOnce(&mut Clock) -> T) -> T {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut clock)
    }

    /// Start or resume playback
    pub fn play(&self) {
        let changed = self.with_clock(|clock| {
            if clock.anchor.is_some() {
                return None;
            }
            clock.anchor = Some(Instant::now());
            clock.transition(PlaybackState::Playing)
        });
        if let Some(state) = changed {
            self.on_state_change(state);
        }
    }

    /// Pause, freezing the position
    pub fn pause(&self) {
        let changed = self.with_clock(|clock| {
            if clock.anchor.is_none() {
                return None;
            }
            clock.base_ms = clock.position();
            clock.anchor = None;
            clock.transition(PlaybackState::Paused)
        });
        if let Some(state) = changed {
            self.on_state_change(state);
        }
    }

    /// Playback speed multiplier; non-positive rates are ignored
    pub fn set_rate(&self, rate: f64) {
        if rate > 0.0 && rate.is_finite() {
            self.with_clock(|clock| {
                clock.base_ms = clock.position();
                if clock.anchor.is_some() {
                    clock.anchor = Some(Instant::now());
                }
                clock.rate = rate;
            });
        }
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.with_clock(|clock| clock.state)
    }

    /// Every seek target received, in order
    pub fn seeks(&self) -> Vec<u64> {
        self.with_clock(|clock| clock.seeks.clone())
    }

    /// Every state change reported through `on_state_change`, in order
    pub fn transitions(&self) -> Vec<PlaybackState> {
        self.with_clock(|clock| clock.transitions.clone())
    }
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Player for SimulatedPlayer {
    fn current_time_millis(&self) -> u64 {
        self.with_clock(|clock| clock.position())
    }

    fn seek_to(&self, millis: u64) {
        self.with_clock(|clock| {
            clock.base_ms = millis;
            if clock.anchor.is_some() {
                clock.anchor = Some(Instant::now());
            }
            clock.seeks.push(millis);
        });
        debug!(position_ms = millis, "Simulated seek");
    }

    fn on_state_change(&self, state: PlaybackState) {
        self.with_clock(|clock| clock.transitions.push(state));
        debug!(state = %state, "Simulated player state change");
    }
}
