//! Peer table: bounded set of peer records, keyed by SID prefix.

use rand::Rng;

use crate::record::{PeerRecord, SID_PREFIX_LEN};

pub const MAX_PEERS: usize = 64;

#[derive(Default)]
pub struct PeerTable {
    peers: Vec<PeerRecord>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self { peers: Vec::with_capacity(MAX_PEERS) }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerRecord> {
        self.peers.iter_mut()
    }

    pub fn find(&self, sid_prefix: &[u8; SID_PREFIX_LEN]) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| &p.sid_prefix == sid_prefix)
    }

    pub fn find_mut(&mut self, sid_prefix: &[u8; SID_PREFIX_LEN]) -> Option<&mut PeerRecord> {
        self.peers.iter_mut().find(|p| &p.sid_prefix == sid_prefix)
    }

    /// Looks up (or creates, evicting randomly if full) the record for a
    /// decoded packet's sender. A generation-id mismatch against an
    /// existing record forces a full reset rather than a fresh insert.
    pub fn observe(&mut self, sid_prefix: [u8; SID_PREFIX_LEN], instance_id: u32) -> &mut PeerRecord {
        if let Some(idx) = self.peers.iter().position(|p| p.sid_prefix == sid_prefix) {
            if self.peers[idx].instance_id != instance_id {
                self.peers[idx].reset_for_new_generation(instance_id);
            }
            return &mut self.peers[idx];
        }

        if self.peers.len() >= MAX_PEERS {
            let idx = rand::thread_rng().gen_range(0..self.peers.len());
            self.peers.swap_remove(idx);
        }

        self.peers.push(PeerRecord::new(sid_prefix, instance_id));
        self.peers.last_mut().unwrap()
    }

    /// Returns every peer whose most recent activity is within
    /// `active_window_ms` of `now_ms`, for the fragment-stuffing loop's
    /// random-active-peer selection.
    pub fn active_peers(&self, now_ms: u64, active_window_ms: u64) -> Vec<&PeerRecord> {
        self.peers.iter().filter(|p| now_ms.saturating_sub(p.last_message_time_ms) <= active_window_ms).collect()
    }
}
