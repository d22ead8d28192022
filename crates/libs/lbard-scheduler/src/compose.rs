//! Outgoing-packet composer: interleaves the report queue,
//! our sync-tree state, and a handful of randomly-chosen peers' in-flight
//! fragments so no single peer monopolises a packet.

use rand::Rng;

use lbard_peer::{PeerTable, TxState, MANIFEST_FULLY_SENT_OFFSET};
use lbard_proto::fields::{Field, FragmentRecord, FragmentStream, SyncRecord};
use lbard_reassembly::BLOCK_LEN;
use lbard_sync::SyncTree;

/// Read access to bundle content the composer needs to build fragments.
/// Kept as a trait so this crate doesn't depend on the store or the
/// engine's bundle table.
pub trait BundleSource {
    fn bid_prefix(&self, bundle_index: usize) -> [u8; 8];
    fn version(&self, bundle_index: usize) -> u64;
    fn body_len(&self, bundle_index: usize) -> u64;
    fn read_body(&self, bundle_index: usize, offset: u64, max_len: usize) -> Vec<u8>;
    fn manifest_len(&self, bundle_index: usize) -> u64;
    fn read_manifest(&self, bundle_index: usize, offset: u64, max_len: usize) -> Vec<u8>;
}

const SYNC_RECORDS_PER_MESSAGE: usize = 6;
const MAX_STUFFING_ATTEMPTS: usize = 10;
const FRAGMENT_FLAGS_NONE: u8 = 0;

fn emit_sync_message(tree: &mut SyncTree, out: &mut Vec<u8>) {
    let records: Vec<SyncRecord> = tree.build_message(SYNC_RECORDS_PER_MESSAGE);
    if records.is_empty() {
        return;
    }
    Field::Sync(records).encode(out);
}

/// Picks the next 64-byte block to send a peer for `bundle_index`,
/// preferring the block with the lowest times-already-sent count and an
/// even-aligned index when counts tie, falling back to plain sequential
/// delivery (restarting at 0 once the tail is covered) when the peer
/// hasn't told us which blocks it's missing.
fn select_block_offset<B: BundleSource>(tx: &mut TxState, counts: &mut [u16; 256], body_len: u64) -> u64 {
    let total_blocks = body_len.div_ceil(BLOCK_LEN).max(1) as usize;
    let candidate_blocks = total_blocks.min(counts.len());

    let mut best: Option<usize> = None;
    for i in 0..candidate_blocks {
        let better = match best {
            None => true,
            Some(b) => {
                counts[i] < counts[b] || (counts[i] == counts[b] && i % 2 == 0 && b % 2 != 0)
            }
        };
        if better {
            best = Some(i);
        }
    }

    match best {
        Some(i) => {
            counts[i] = counts[i].saturating_add(1);
            i as u64 * BLOCK_LEN
        }
        None => {
            let offset = if tx.body_offset >= body_len { 0 } else { tx.body_offset };
            let next = offset + BLOCK_LEN;
            tx.body_offset = if next >= body_len { 0 } else { next };
            offset
        }
    }
}

/// Sends the next chunk of a bundle's manifest text, advancing
/// `tx.manifest_offset` itself (no bitmap feedback loop for manifests,
/// unlike body blocks) until it reaches the "fully sent" sentinel.
fn build_manifest_fragment_field<B: BundleSource>(tx: &mut TxState, bundle_index: usize, bundles: &B) -> Option<Field> {
    let manifest_len = bundles.manifest_len(bundle_index);
    if manifest_len == 0 || tx.manifest_offset as u64 >= manifest_len {
        return None;
    }
    let offset = tx.manifest_offset as u64;
    let take = BLOCK_LEN.min(manifest_len - offset) as usize;
    let data = bundles.read_manifest(bundle_index, offset, take);
    if data.is_empty() {
        return None;
    }
    let end_of_stream = offset + data.len() as u64 >= manifest_len;
    tx.manifest_offset = if end_of_stream { MANIFEST_FULLY_SENT_OFFSET } else { (offset + data.len() as u64) as u32 };
    Some(Field::Fragment(FragmentRecord {
        stream: FragmentStream::Manifest,
        end_of_stream,
        bid_prefix: bundles.bid_prefix(bundle_index),
        version: bundles.version(bundle_index),
        start_offset: offset,
        flags: FRAGMENT_FLAGS_NONE,
        data,
    }))
}

fn build_fragment_field<B: BundleSource>(
    tx: &mut TxState,
    counts: &mut [u16; 256],
    bundle_index: usize,
    bundles: &B,
) -> Option<Field> {
    let body_len = bundles.body_len(bundle_index);
    if body_len == 0 {
        return None;
    }
    let offset = select_block_offset::<B>(tx, counts, body_len);
    let take = BLOCK_LEN.min(body_len - offset) as usize;
    let data = bundles.read_body(bundle_index, offset, take);
    if data.is_empty() {
        return None;
    }
    let end_of_stream = offset + data.len() as u64 >= body_len;
    Some(Field::Fragment(FragmentRecord {
        stream: FragmentStream::Body,
        end_of_stream,
        bid_prefix: bundles.bid_prefix(bundle_index),
        version: bundles.version(bundle_index),
        start_offset: offset,
        flags: FRAGMENT_FLAGS_NONE,
        data,
    }))
}

/// Builds one outgoing packet's field bytes (everything after the 8-byte
/// header): drains the report queue, maybe emits a sync message, stuffs
/// fragments for up to ten randomly-chosen peers, and guarantees at least
/// one sync message went out if none did earlier.
pub fn compose_packet_body<B: BundleSource>(
    report_bytes: Vec<Vec<u8>>,
    own_sync_tree: &mut SyncTree,
    peers: &mut PeerTable,
    bundles: &B,
    mtu: usize,
    rng: &mut impl Rng,
) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in report_bytes {
        out.extend_from_slice(&entry);
    }

    let mut sync_sent = false;
    if rng.gen_bool(0.5) {
        emit_sync_message(own_sync_tree, &mut out);
        sync_sent = true;
    }

    let peer_count = peers.len();
    if peer_count > 0 {
        for _ in 0..MAX_STUFFING_ATTEMPTS {
            if out.len() >= mtu {
                break;
            }
            let idx = rng.gen_range(0..peer_count);
            let Some(peer) = peers.iter_mut().nth(idx) else { continue };
            let Some(bundle_index) = peer.tx.current_bundle() else { continue };
            let field = build_manifest_fragment_field(&mut peer.tx, bundle_index, bundles)
                .or_else(|| build_fragment_field(&mut peer.tx, &mut peer.request_bitmap_counts, bundle_index, bundles));
            if let Some(field) = field {
                let mut buf = Vec::new();
                field.encode(&mut buf);
                if out.len() + buf.len() <= mtu {
                    out.extend(buf);
                }
            }
        }
    }

    if !sync_sent {
        emit_sync_message(own_sync_tree, &mut out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbard_peer::PeerRecord;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct FakeBundles;

    impl BundleSource for FakeBundles {
        fn bid_prefix(&self, _bundle_index: usize) -> [u8; 8] {
            [7; 8]
        }
        fn version(&self, _bundle_index: usize) -> u64 {
            1
        }
        fn body_len(&self, _bundle_index: usize) -> u64 {
            200
        }
        fn read_body(&self, _bundle_index: usize, offset: u64, max_len: usize) -> Vec<u8> {
            let len = max_len.min((200 - offset) as usize);
            vec![0xAB; len]
        }
        fn manifest_len(&self, _bundle_index: usize) -> u64 {
            0
        }
        fn read_manifest(&self, _bundle_index: usize, _offset: u64, _max_len: usize) -> Vec<u8> {
            Vec::new()
        }
    }

    #[test]
    fn sequential_selection_without_bitmap_advances_and_wraps() {
        let mut tx = TxState::new();
        let mut counts = [0u16; 256];
        let first = select_block_offset::<FakeBundles>(&mut tx, &mut counts, 200);
        let second = select_block_offset::<FakeBundles>(&mut tx, &mut counts, 200);
        assert_eq!(first, 0);
        assert_eq!(second, 64);
    }

    #[test]
    fn lowest_send_count_block_is_preferred_when_counts_seeded() {
        let mut tx = TxState::new();
        let mut counts = [5u16; 256];
        counts[2] = 0;
        let offset = select_block_offset::<FakeBundles>(&mut tx, &mut counts, 256);
        assert_eq!(offset, 2 * BLOCK_LEN);
        assert_eq!(counts[2], 1);
    }

    #[test]
    fn compose_includes_report_bytes_and_stays_under_mtu() {
        let mut tree = SyncTree::new();
        let mut peers = PeerTable::new();
        let mut rng = StdRng::seed_from_u64(42);
        let body = compose_packet_body(
            vec![vec![1, 2, 3]],
            &mut tree,
            &mut peers,
            &FakeBundles,
            200,
            &mut rng,
        );
        assert!(body.len() <= 200);
        assert_eq!(&body[..3], &[1, 2, 3]);
    }

    #[test]
    fn stuffs_fragments_for_a_peer_with_an_active_bundle() {
        let mut tree = SyncTree::new();
        let mut peers = PeerTable::new();
        peers.observe([1, 2, 3, 4], 1).tx.admit(0, 100);
        let mut rng = StdRng::seed_from_u64(7);
        let body = compose_packet_body(vec![], &mut tree, &mut peers, &FakeBundles, 4096, &mut rng);
        assert!(!body.is_empty());
        assert!(body.contains(&b'q') || body.contains(&b'Q') || body.contains(&b'S'));
    }
}
