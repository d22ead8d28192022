//! Partial-reassembly table: the fixed-size set of in-flight incoming
//! bundles.

use std::collections::VecDeque;

use rand::Rng;

use crate::bitmap::{derive_body_bitmap, derive_manifest_bitmap, ProgressBitmap};
use crate::segment::SegmentList;

pub const MAX_BUNDLES_IN_FLIGHT: usize = 16;
pub const MAX_RECENT_SENDERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentSender {
    pub sid_prefix: [u8; 2],
    pub last_time_ms: u64,
}

/// A bundle below this version threshold is a journal: its body length
/// always equals its version.
pub fn is_journal_version(version: u64) -> bool {
    version < (1u64 << 32)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSlot {
    pub bid_prefix: [u8; 8],
    pub version: u64,
    pub manifest_length: Option<u64>,
    pub body_length: Option<u64>,
    pub manifest_segments: SegmentList,
    pub body_segments: SegmentList,
    recent_senders: VecDeque<RecentSender>,
}

impl PartialSlot {
    pub fn new(bid_prefix: [u8; 8], version: u64) -> Self {
        let body_length = is_journal_version(version).then_some(version);
        Self {
            bid_prefix,
            version,
            manifest_length: None,
            body_length,
            manifest_segments: SegmentList::new(),
            body_segments: SegmentList::new(),
            recent_senders: VecDeque::with_capacity(MAX_RECENT_SENDERS),
        }
    }

    /// Pre-seeds the body stream with bytes already known from an older
    /// version of the same journal bundle, so only the appended tail needs
    /// to cross the radio link.
    pub fn seed_from_prior_version(&mut self, prior_body: &[u8]) {
        self.body_segments.insert(0, prior_body);
    }

    pub fn note_sender(&mut self, sid_prefix: [u8; 2], now_ms: u64) {
        if let Some(existing) = self.recent_senders.iter_mut().find(|s| s.sid_prefix == sid_prefix) {
            existing.last_time_ms = now_ms;
            return;
        }
        if self.recent_senders.len() >= MAX_RECENT_SENDERS {
            self.recent_senders.pop_front();
        }
        self.recent_senders.push_back(RecentSender { sid_prefix, last_time_ms: now_ms });
    }

    pub fn recent_senders(&self) -> impl Iterator<Item = &RecentSender> {
        self.recent_senders.iter()
    }

    pub fn is_complete(&self) -> bool {
        match (self.manifest_length, self.body_length) {
            (Some(m), Some(b)) => self.manifest_segments.is_complete(m) && self.body_segments.is_complete(b),
            _ => false,
        }
    }

    pub fn body_bitmap(&self) -> ProgressBitmap {
        derive_body_bitmap(&self.body_segments, self.body_length)
    }

    pub fn manifest_bitmap(&self) -> ProgressBitmap {
        derive_manifest_bitmap(&self.manifest_segments, self.manifest_length)
    }
}

/// A source of bytes for a bundle version this node already holds in full,
/// used to pre-seed a journal bundle's extension. Implemented by the store
/// layer; kept as a trait here so reassembly doesn't depend on HTTP.
/// `new_version` is the version being assembled; implementations return the
/// body of whatever older version of the same bid they already hold, if any.
pub trait PriorVersionSource {
    fn fetch_prior_body(&self, bid_prefix: &[u8; 8], new_version: u64) -> Option<Vec<u8>>;
}

pub struct NoPriorVersions;

impl PriorVersionSource for NoPriorVersions {
    fn fetch_prior_body(&self, _bid_prefix: &[u8; 8], _new_version: u64) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Default)]
pub struct PartialTable {
    slots: Vec<PartialSlot>,
}

impl PartialTable {
    pub fn new() -> Self {
        Self { slots: Vec::with_capacity(MAX_BUNDLES_IN_FLIGHT) }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, bid_prefix: &[u8; 8]) -> Option<&PartialSlot> {
        self.slots.iter().find(|s| &s.bid_prefix == bid_prefix)
    }

    pub fn find_mut(&mut self, bid_prefix: &[u8; 8]) -> Option<&mut PartialSlot> {
        self.slots.iter_mut().find(|s| &s.bid_prefix == bid_prefix)
    }

    /// Returns the slot for `(bid_prefix, version)`, creating it (and
    /// pre-seeding it if it's a journal extension of something already
    /// held) if this is the first fragment seen for it.
    pub fn get_or_create(
        &mut self,
        bid_prefix: [u8; 8],
        version: u64,
        prior_versions: &dyn PriorVersionSource,
    ) -> &mut PartialSlot {
        if let Some(idx) = self.slots.iter().position(|s| s.bid_prefix == bid_prefix && s.version == version) {
            return &mut self.slots[idx];
        }

        if self.slots.len() >= MAX_BUNDLES_IN_FLIGHT {
            self.evict_random();
        }

        let mut slot = PartialSlot::new(bid_prefix, version);
        if is_journal_version(version) {
            if let Some(prior) = prior_versions.fetch_prior_body(&bid_prefix, version) {
                slot.seed_from_prior_version(&prior);
            }
        }
        self.slots.push(slot);
        self.slots.last_mut().unwrap()
    }

    fn evict_random(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        let idx = rand::thread_rng().gen_range(0..self.slots.len());
        self.slots.swap_remove(idx);
    }

    pub fn remove(&mut self, bid_prefix: &[u8; 8]) {
        self.slots.retain(|s| &s.bid_prefix != bid_prefix);
    }

    /// Drains and returns every slot that has finished reassembling, for
    /// hand-off to the store import step.
    pub fn take_completed(&mut self) -> Vec<PartialSlot> {
        let (done, remaining): (Vec<_>, Vec<_>) = self.slots.drain(..).partition(|s| s.is_complete());
        self.slots = remaining;
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_for_non_journal_bundle_has_unknown_body_length() {
        let mut table = PartialTable::new();
        let slot = table.get_or_create([1; 8], u64::MAX, &NoPriorVersions);
        assert_eq!(slot.body_length, None);
    }

    #[test]
    fn journal_slot_derives_body_length_from_version() {
        let mut table = PartialTable::new();
        let slot = table.get_or_create([1; 8], 1000, &NoPriorVersions);
        assert_eq!(slot.body_length, Some(1000));
    }

    struct FixedPrior(Vec<u8>);
    impl PriorVersionSource for FixedPrior {
        fn fetch_prior_body(&self, _bid_prefix: &[u8; 8], _new_version: u64) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn journal_extension_preseeds_known_prefix() {
        let mut table = PartialTable::new();
        let prior = FixedPrior(vec![0xAB; 1000]);
        let slot = table.get_or_create([2; 8], 2000, &prior);
        assert_eq!(slot.body_segments.first_missing_byte(), 1000);
    }

    #[test]
    fn eviction_keeps_table_bounded() {
        let mut table = PartialTable::new();
        for i in 0..(MAX_BUNDLES_IN_FLIGHT + 4) {
            let mut bid = [0u8; 8];
            bid[0] = i as u8;
            bid[1] = (i >> 8) as u8;
            table.get_or_create(bid, u64::MAX, &NoPriorVersions);
        }
        assert_eq!(table.len(), MAX_BUNDLES_IN_FLIGHT);
    }

    #[test]
    fn completion_and_drain() {
        let mut table = PartialTable::new();
        let slot = table.get_or_create([3; 8], u64::MAX, &NoPriorVersions);
        slot.manifest_length = Some(4);
        slot.manifest_segments.insert(0, &[1, 2, 3, 4]);
        slot.body_length = Some(2);
        slot.body_segments.insert(0, &[9, 9]);
        assert!(slot.is_complete());
        let done = table.take_completed();
        assert_eq!(done.len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn recent_senders_ring_is_bounded() {
        let mut slot = PartialSlot::new([0; 8], u64::MAX);
        for i in 0..(MAX_RECENT_SENDERS as u8 + 3) {
            slot.note_sender([i, 0], i as u64);
        }
        assert_eq!(slot.recent_senders().count(), MAX_RECENT_SENDERS);
    }
}
