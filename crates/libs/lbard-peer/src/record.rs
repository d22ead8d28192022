//! Peer record.

use std::collections::VecDeque;

use lbard_reassembly::ProgressBitmap;
use lbard_sync::SyncTree;

use crate::tx_queue::TxState;

pub const SID_PREFIX_LEN: usize = 4;
pub const MAX_RSSI_LOG: usize = 32;

/// High bit of the 15-bit message number field marks a retransmission.
pub const RETRANSMISSION_FLAG: u16 = 0x4000;
pub const MESSAGE_NUMBER_MASK: u16 = 0x3FFF;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub sid_prefix: [u8; SID_PREFIX_LEN],
    pub last_message_time_ms: u64,
    pub last_message_number: u16,
    pub instance_id: u32,
    pub tx: TxState,
    pub request_bitmap_bundle: Option<[u8; 8]>,
    pub request_body_bitmap: Option<ProgressBitmap>,
    pub request_manifest_bitmap: Option<ProgressBitmap>,
    /// Per-block send counts to the same peer, used to pick the
    /// least-resent block first.
    pub request_bitmap_counts: [u16; 256],
    pub request_bitmap_manifest_counts: [u16; 16],
    pub sync_state: SyncTree,
    rssi_log: VecDeque<i8>,
    pub missed_packet_count: u32,
}

impl PeerRecord {
    pub fn new(sid_prefix: [u8; SID_PREFIX_LEN], instance_id: u32) -> Self {
        Self {
            sid_prefix,
            last_message_time_ms: 0,
            last_message_number: 0,
            instance_id,
            tx: TxState::new(),
            request_bitmap_bundle: None,
            request_body_bitmap: None,
            request_manifest_bitmap: None,
            request_bitmap_counts: [0; 256],
            request_bitmap_manifest_counts: [0; 16],
            sync_state: SyncTree::new(),
            rssi_log: VecDeque::with_capacity(MAX_RSSI_LOG),
            missed_packet_count: 0,
        }
    }

    pub fn note_rssi(&mut self, rssi: i8) {
        if self.rssi_log.len() >= MAX_RSSI_LOG {
            self.rssi_log.pop_front();
        }
        self.rssi_log.push_back(rssi);
    }

    pub fn rssi_log(&self) -> &VecDeque<i8> {
        &self.rssi_log
    }

    pub fn is_retransmission(message_number_field: u16) -> bool {
        message_number_field & RETRANSMISSION_FLAG != 0
    }

    /// Resets everything about this peer except its address — used when
    /// the peer's generation id changes mid-session, so no stale offset or bitmap survives into the new
    /// session.
    pub fn reset_for_new_generation(&mut self, instance_id: u32) {
        let sid_prefix = self.sid_prefix;
        *self = Self::new(sid_prefix, instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retransmission_flag_detection() {
        assert!(PeerRecord::is_retransmission(RETRANSMISSION_FLAG | 5));
        assert!(!PeerRecord::is_retransmission(5));
    }

    #[test]
    fn generation_reset_clears_tx_state_but_keeps_address() {
        let mut peer = PeerRecord::new([1, 2, 3, 4], 1);
        peer.tx.admit(7, 100);
        peer.missed_packet_count = 5;
        peer.reset_for_new_generation(2);
        assert_eq!(peer.sid_prefix, [1, 2, 3, 4]);
        assert_eq!(peer.instance_id, 2);
        assert_eq!(peer.tx.current_bundle(), None);
        assert_eq!(peer.missed_packet_count, 0);
    }

    #[test]
    fn rssi_log_is_bounded() {
        let mut peer = PeerRecord::new([0; 4], 1);
        for i in 0..(MAX_RSSI_LOG + 10) {
            peer.note_rssi((i % 128) as i8);
        }
        assert_eq!(peer.rssi_log().len(), MAX_RSSI_LOG);
    }
}
