//! Per-peer transmit state: one current bundle plus a FIFO of upcoming
//! ones with cached priorities.

use std::collections::VecDeque;

pub const MANIFEST_FULLY_SENT_OFFSET: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedBundle {
    pub bundle_index: usize,
    pub priority: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TxState {
    current: Option<QueuedBundle>,
    queue: VecDeque<QueuedBundle>,
    pub manifest_offset: u32,
    pub body_offset: u64,
}

impl TxState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_bundle(&self) -> Option<usize> {
        self.current.map(|c| c.bundle_index)
    }

    pub fn queued_bundles(&self) -> impl Iterator<Item = usize> + '_ {
        self.queue.iter().map(|q| q.bundle_index)
    }

    /// Admits a bundle the sync layer has declared the peer is missing.
    /// Strictly higher priority than the current transmission displaces it
    /// (the displaced bundle goes back on the queue); otherwise it's
    /// appended to the queue.
    pub fn admit(&mut self, bundle_index: usize, priority: i64) {
        if self.queue.iter().any(|q| q.bundle_index == bundle_index)
            || self.current.is_some_and(|c| c.bundle_index == bundle_index)
        {
            return; // already known to this peer's queue
        }
        let candidate = QueuedBundle { bundle_index, priority };
        match self.current {
            None => {
                self.current = Some(candidate);
                self.manifest_offset = 0;
                self.body_offset = 0;
            }
            Some(current) if priority > current.priority => {
                self.queue.push_front(current);
                self.current = Some(candidate);
                self.manifest_offset = 0;
                self.body_offset = 0;
            }
            Some(_) => self.queue.push_back(candidate),
        }
    }

    /// Completes the current transmission and promotes the queue head.
    pub fn advance(&mut self) {
        self.current = self.queue.pop_front();
        self.manifest_offset = 0;
        self.body_offset = 0;
    }

    /// Removes a bundle from the waiting queue (e.g. an ack named it
    /// directly, so it no longer needs a turn as `current`).
    pub fn remove_from_queue(&mut self, bundle_index: usize) {
        self.queue.retain(|q| q.bundle_index != bundle_index);
    }

    /// Applies an `A` field's offsets. If they cover the current bundle in
    /// full, the transmission finishes and the queue head is promoted;
    /// otherwise the offsets are simply adopted so transmission continues
    /// from there. Acks naming a queued (not current) bundle just drop it
    /// from the queue; acks naming an unknown bundle are ignored.
    pub fn apply_ack(&mut self, bundle_index: usize, manifest_offset: u32, body_offset: u64, bundle_length: u64) {
        match self.current {
            Some(current) if current.bundle_index == bundle_index => {
                if manifest_offset >= MANIFEST_FULLY_SENT_OFFSET && body_offset >= bundle_length {
                    self.advance();
                } else {
                    self.manifest_offset = manifest_offset;
                    self.body_offset = body_offset;
                }
            }
            _ => self.remove_from_queue(bundle_index),
        }
    }
}
