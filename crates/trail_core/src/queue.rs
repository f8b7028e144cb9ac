//! Pending-award queue.
//!
//! Awards credited locally but not yet acknowledged by the remote service,
//! in enqueue order. The sync loop takes the whole queue as one batch and
//! leaves a fresh empty queue behind for awards made during the pass.

use crate::events::AwardEvent;
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    items: VecDeque<AwardEvent>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AwardEvent) {
        self.items.push_back(event);
    }

    /// Put a failed item back at the end of the current queue
    pub fn requeue(&mut self, event: AwardEvent) {
        self.items.push_back(event);
    }

    /// Snapshot and clear in one step
    pub fn take_batch(&mut self) -> Vec<AwardEvent> {
        std::mem::take(&mut self.items).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AwardEvent> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
