//! Reveal queue - backlog annotations waiting for playback to reach them
//!
//! Each tick partitions the pending set by the current playback position:
//! annotations at or before the position are handed back for rendering in
//! their original order and removed, the rest stay pending. Pending entries
//! are never reordered and an annotation leaves the queue at most once.

use crate::types::Annotation;

/// Pending backlog annotations
#[derive(Debug, Clone, Default)]
pub struct RevealQueue {
    pending: Vec<Annotation>,
}

impl RevealQueue {
    /// Create a queue over a join backlog
    pub fn new(backlog: Vec<Annotation>) -> Self {
        Self { pending: backlog }
    }

    /// Take every annotation due at `position` (ms), in original order
    pub fn tick(&mut self, position: u64) -> Vec<Annotation> {
        let (due, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|ann| ann.at <= position);
        self.pending = remaining;
        due
    }

    /// Append a rejoin backlog, skipping ids already pending
    pub fn extend(&mut self, backlog: impl IntoIterator<Item = Annotation>) {
        for ann in backlog {
            if !self.pending.iter().any(|pending| pending.id == ann.id) {
                self.pending.push(ann);
            }
        }
    }

    /// Annotations not yet revealed
    pub fn pending(&self) -> &[Annotation] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
