//! The cooperative main loop: drain RX, drive the radio state
//! machine, maybe poll the store, maybe emit a packet, maybe service the
//! submission socket, sleep. No threads, no locks — everything here is
//! exclusively owned by whichever call frame is running `tick`.

use rand::rngs::StdRng;
use rand::SeedableRng;

use lbard_peer::{PeerTable, ReportQueue};
use lbard_proto::fields::{BarRecord, Field, RequestRecord};
use lbard_proto::packet::{decode_packet, encode_packet, PacketHeader};
use lbard_proto::sid::{peer_prefix_of, PACKET_SID_PREFIX_LEN};
use lbard_proto::time::LbardTime;
use lbard_radio::{fec_decode, fec_encode, DriverKind, RadioDriver};
use lbard_reassembly::PartialTable;
use lbard_scheduler::{compose_packet_body, CongestionController};
use lbard_sync::{SyncTree, SYNC_KEY_LEN};

use crate::bundle::BundleTable;
use crate::error::EngineError;
use crate::timesync::{TimeRole, TimeSync};

pub const MTU: usize = 255 - 32 - PACKET_SID_PREFIX_LEN - 2;
const SLEEP_MS: u64 = 10;
const MAX_CONSECUTIVE_RESETS_BEFORE_STUCK: u32 = 4;
/// How many bundles we announce a [`Field::Bar`] for per outgoing packet
///: bounded so a large bundle table can't crowd
/// out the fragments already in flight.
const MAX_BAR_ANNOUNCEMENTS_PER_PACKET: usize = 4;

fn size_class_of(length: u64) -> u8 {
    (64 - length.max(1).leading_zeros()) as u8
}

/// Encodes a `Field::Request` for `bid_prefix`, addressed at the peer that
/// just announced it via a `Field::Bar` we don't already hold.
fn encode_request(peer_key: [u8; 4], bid_prefix: [u8; 8]) -> Vec<u8> {
    let mut buf = Vec::new();
    Field::Request(RequestRecord { recipient_prefix: peer_key, bid_prefix, block_index: 0 }).encode(&mut buf);
    buf
}

/// Intrinsic send priority for a bundle a peer is missing:
/// personal messaging outranks bulk content, and shorter bundles outrank
/// longer ones so a long transfer can't starve small urgent ones.
fn bundle_priority(bundle: &crate::bundle::BundleRecord) -> i64 {
    let service_bonus = if bundle.is_journal() || bundle.service.starts_with("MeshMS") { 1_000_000 } else { 0 };
    service_bonus - bundle.length as i64
}

pub struct EngineOptions {
    pub our_sid_prefix: [u8; PACKET_SID_PREFIX_LEN],
    pub our_instance_id: u32,
    pub congestion_target: u32,
    pub time_role: TimeRole,
    pub reboot_when_stuck: bool,
}

pub struct Engine<D: RadioDriver> {
    driver: D,
    options: EngineOptions,
    bundles: BundleTable,
    peers: PeerTable,
    partials: PartialTable,
    own_sync_tree: SyncTree,
    report_queue: ReportQueue,
    congestion: CongestionController,
    time_sync: TimeSync,
    rng: StdRng,
    window_started_ms: u64,
    window_packets_seen: u32,
    window_packets_byus: u32,
    next_send_ms: u64,
    consecutive_resets: u32,
}

impl<D: RadioDriver> Engine<D> {
    pub fn new(driver: D, options: EngineOptions, seed: u64) -> Self {
        let congestion = CongestionController::new(options.congestion_target);
        let time_sync = TimeSync::new(options.time_role, 1);
        Self {
            driver,
            options,
            bundles: BundleTable::new(),
            peers: PeerTable::new(),
            partials: PartialTable::new(),
            own_sync_tree: SyncTree::new(),
            report_queue: ReportQueue::new(),
            congestion,
            time_sync,
            rng: StdRng::seed_from_u64(seed),
            window_started_ms: 0,
            window_packets_seen: 0,
            window_packets_byus: 0,
            next_send_ms: 0,
            consecutive_resets: 0,
        }
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    /// Swaps out the underlying transport, keeping every other piece of
    /// state (bundle table, peer table, partial reassembly, sync tree)
    /// intact. A serial or UHF link can drop and come back without us
    /// forgetting what we already know; the peer on the other end may come
    /// back with a new instance id, which `PeerTable::observe` treats as a
    /// fresh generation rather than as a reason to discard our own state.
    pub fn replace_driver(&mut self, driver: D) {
        self.driver = driver;
    }

    pub fn bundles(&self) -> &BundleTable {
        &self.bundles
    }

    pub fn bundles_mut(&mut self) -> &mut BundleTable {
        &mut self.bundles
    }

    /// Registers a bundle discovered locally (originated here or pulled
    /// from the store mirror) and, if the table actually changed, folds
    /// its sync key into our advertised sync tree so peers learn of it.
    pub fn register_bundle(&mut self, record: crate::bundle::BundleRecord) {
        let sync_key = record.sync_key;
        if self.bundles.register(record) {
            self.own_sync_tree.add_key(sync_key);
        }
    }

    /// One pass of the main loop: non-blocking RX drain, radio service
    /// tick, congestion-window rollover, and a possible outgoing packet.
    /// Every error variant is handled inside this call; only the
    /// `rebootwhenstuck` escalation is allowed to propagate.
    pub fn tick(&mut self, now_ms: u64, rx_bytes: &[u8]) -> Result<(), EngineError> {
        self.driver.service_tick(now_ms);

        if !rx_bytes.is_empty() {
            match self.driver.receive_bytes(rx_bytes) {
                Ok(packets) => {
                    for received in packets {
                        self.window_packets_seen += 1;
                        if let Err(err) = self.handle_incoming(&received.bytes, now_ms) {
                            self.handle_error(err, now_ms)?;
                        }
                    }
                }
                Err(err) => self.handle_error(EngineError::DriverConfused(err.to_string()), now_ms)?,
            }
        }

        if self.window_started_ms == 0 {
            self.window_started_ms = now_ms;
        }
        if now_ms.saturating_sub(self.window_started_ms) >= lbard_scheduler::WINDOW_MS {
            let active_peers = self.peers.active_peers(now_ms, lbard_scheduler::WINDOW_MS).len() as u32;
            let should_reset =
                self.congestion.on_window_elapsed(self.window_packets_seen, self.window_packets_byus, active_peers);
            self.window_started_ms = now_ms;
            self.window_packets_seen = 0;
            self.window_packets_byus = 0;
            if should_reset {
                self.handle_error(EngineError::Transient("radio silent for four windows".to_owned()), now_ms)?;
            }
        }

        if now_ms >= self.next_send_ms && self.driver.ready_to_send() {
            self.emit_packet(now_ms);
            let jitter = self.congestion.launch_jitter_ms(&mut self.rng);
            self.next_send_ms = now_ms + self.congestion.interval_ms() + jitter;
        }

        Ok(())
    }

    /// Bytes the caller should write to the transport this pass.
    pub fn drain_tx(&mut self) -> Vec<u8> {
        self.driver.drain_tx()
    }

    fn handle_incoming(&mut self, fec_bytes: &[u8], now_ms: u64) -> Result<(), EngineError> {
        let decoded = fec_decode(fec_bytes)?;
        let packet = decode_packet(&decoded.data)?;

        if packet.header.sender_prefix == self.options.our_sid_prefix {
            return Ok(()); // our own echoed transmission
        }

        let peer_key = peer_prefix_of(&packet.header.sender_prefix);
        let mut instance_id = self.options.our_instance_id;
        for field in &packet.fields {
            if let Field::Generation(id) = field {
                instance_id = *id;
            }
        }
        let peer = self.peers.observe(peer_key, instance_id);
        peer.last_message_time_ms = now_ms;

        for field in packet.fields {
            match field {
                Field::Time(incoming_time) => {
                    let our_now = LbardTime { stratum: 1, seconds: now_ms / 1000, micros: 0 };
                    self.time_sync.consider(now_ms, &incoming_time, &our_now);
                }
                Field::Sync(records) => {
                    let key_bits = (SYNC_KEY_LEN * 8) as u8;
                    for record in &records {
                        if record.prefix_len == key_bits {
                            peer.sync_state.add_key(record.key);
                        }
                    }
                    // Compared against our own tree (not the peer's mirror):
                    // a leaf the peer advertised that we don't hold is
                    // exactly what `Field::Bar` announcements let us name
                    // and request below, so the diff itself is just a
                    // drill-down signal for future rounds.
                    let diff = self.own_sync_tree.recv_message(&records);
                    if !diff.drilled_down.is_empty() {
                        log::debug!("sync tree diverges with {peer_key:02x?} at {} paths", diff.drilled_down.len());
                    }
                }
                Field::Bar(bar) => {
                    let held_version =
                        self.bundles.iter().find(|b| b.bid_bin[..8] == bar.bid_prefix[..]).map(|b| b.version);
                    let need_it = match held_version {
                        Some(version) => version < bar.version,
                        None => true,
                    };
                    if need_it {
                        self.report_queue.push(encode_request(peer_key, bar.bid_prefix));
                    }
                }
                Field::Request(request) => {
                    let our_peer_prefix = peer_prefix_of(&self.options.our_sid_prefix);
                    if request.recipient_prefix == our_peer_prefix {
                        if let Some(idx) = self.bundles.iter().position(|b| b.bid_bin[..8] == request.bid_prefix[..]) {
                            let bundle = self.bundles.iter().nth(idx).expect("index just found");
                            peer.tx.admit(idx, bundle_priority(bundle));
                        }
                    }
                }
                Field::Ack(ack) => {
                    if let Some(bundle_index) =
                        self.bundles.iter().position(|b| b.bid_bin[..8] == ack.bid_prefix[..])
                    {
                        let bundle_length = self.bundles.iter().nth(bundle_index).map(|b| b.length).unwrap_or(0);
                        peer.tx.apply_ack(bundle_index, ack.manifest_offset as u32, ack.body_offset as u64, bundle_length);
                    }
                }
                Field::Fragment(fragment) => {
                    let slot = self.partials.get_or_create(fragment.bid_prefix, fragment.version, &self.bundles);
                    let end_of_stream = fragment.end_of_stream;
                    let total_len = fragment.start_offset + fragment.data.len() as u64;
                    match fragment.stream {
                        lbard_proto::fields::FragmentStream::Manifest => {
                            slot.manifest_segments.insert(fragment.start_offset, &fragment.data);
                            if end_of_stream {
                                slot.manifest_length = Some(total_len);
                            }
                        }
                        lbard_proto::fields::FragmentStream::Body => {
                            slot.body_segments.insert(fragment.start_offset, &fragment.data);
                            if end_of_stream && slot.body_length.is_none() {
                                slot.body_length = Some(total_len);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        for completed in self.partials.take_completed() {
            log::info!("bundle {:02x?} version {} reassembled", completed.bid_prefix, completed.version);
            if let Some(record) = self.bundle_record_from_completed(&completed) {
                self.register_bundle(record);
            }
        }

        Ok(())
    }

    /// Turns a finished [`lbard_reassembly::PartialSlot`] into a record our
    /// own sync tree can re-advertise. Only the bundle's 8-byte wire prefix
    /// ever crosses the link (same as acks and fragments address by), so
    /// the reassembled record's full BID is the prefix zero-padded, not a
    /// recovered 32-byte identifier.
    fn bundle_record_from_completed(
        &self,
        completed: &lbard_reassembly::PartialSlot,
    ) -> Option<crate::bundle::BundleRecord> {
        let manifest_length = completed.manifest_length?;
        let body_length = completed.body_length?;
        let manifest_bytes = completed.manifest_segments.read(0, manifest_length)?;
        let body = completed.body_segments.read(0, body_length)?.to_vec();
        let manifest_text = String::from_utf8_lossy(manifest_bytes).into_owned();

        let mut bid_bin = [0u8; 32];
        bid_bin[..8].copy_from_slice(&completed.bid_prefix);
        let bid_hex = hex::encode(completed.bid_prefix);
        let filehash = {
            use sha2::{Digest, Sha256};
            hex::encode(Sha256::digest(&body))
        };

        Some(crate::bundle::BundleRecord {
            bid_hex: bid_hex.clone(),
            bid_bin,
            version: completed.version,
            length: body_length,
            service: if lbard_reassembly::is_journal_version(completed.version) {
                "MeshMS2".to_owned()
            } else {
                "file".to_owned()
            },
            author: None,
            originated_here: false,
            filehash: filehash.clone(),
            sender: None,
            recipient: None,
            sync_key: lbard_sync::derive_sync_key(&bid_hex, &filehash, body_length, completed.version),
            last_announced_time_ms: 0,
            last_manifest_offset_announced: 0,
            last_body_offset_announced: 0,
            last_priority: 0,
            num_peers_that_dont_have_it: 0,
            manifest_text,
            body,
        })
    }

    fn emit_packet(&mut self, now_ms: u64) {
        let report_bytes: Vec<Vec<u8>> =
            self.report_queue.drain_for_packet(MTU).into_iter().map(|entry| entry.bytes).collect();
        let body = compose_packet_body(
            report_bytes,
            &mut self.own_sync_tree,
            &mut self.peers,
            &self.bundles,
            MTU,
            &mut self.rng,
        );
        if body.is_empty() {
            return;
        }

        let header = PacketHeader { version: 1, sender_prefix: self.options.our_sid_prefix };
        let mut full = encode_packet(&header, &[]);
        Field::Time(LbardTime { stratum: 1, seconds: now_ms / 1000, micros: 0 }).encode(&mut full);
        Field::Generation(self.options.our_instance_id).encode(&mut full);
        self.encode_bar_announcements(&mut full, now_ms);
        full.extend_from_slice(&body);

        if let Ok(encoded) = fec_encode(&full) {
            if self.driver.send_packet(&encoded).is_ok() {
                self.window_packets_byus += 1;
            }
        }
    }

    /// Announces up to [`MAX_BAR_ANNOUNCEMENTS_PER_PACKET`] held bundles by
    /// their real bid prefix, since the sync tree's leaf keys are opaque
    /// hashes a peer missing the bundle can't invert on its own. Picks the
    /// bundles with the oldest `last_announced_time_ms` first and bumps
    /// their timestamp, so a table bigger than the per-packet cap still
    /// cycles through every bundle instead of only ever naming the first
    /// few.
    fn encode_bar_announcements(&mut self, out: &mut Vec<u8>, now_ms: u64) {
        let mut candidates: Vec<(String, u64, u64, u8)> = self
            .bundles
            .iter()
            .map(|b| (b.bid_hex.clone(), b.last_announced_time_ms, b.version, size_class_of(b.length)))
            .collect();
        candidates.sort_by_key(|(_, last_announced, ..)| *last_announced);

        for (bid_hex, _, version, size_class) in candidates.into_iter().take(MAX_BAR_ANNOUNCEMENTS_PER_PACKET) {
            let Some(bundle) = self.bundles.find_by_bid_mut(&bid_hex) else { continue };
            bundle.last_announced_time_ms = now_ms;
            let mut bid_prefix = [0u8; 8];
            bid_prefix.copy_from_slice(&bundle.bid_bin[..8]);
            Field::Bar(BarRecord { bid_prefix, version, recipient_prefix: [0; 4], size_class }).encode(out);
        }
    }

    fn handle_error(&mut self, err: EngineError, _now_ms: u64) -> Result<(), EngineError> {
        match err {
            EngineError::Transient(_) | EngineError::DriverConfused(_) => {
                log::warn!("{err}, resetting radio driver");
                self.consecutive_resets += 1;
                if self.options.reboot_when_stuck && self.consecutive_resets >= MAX_CONSECUTIVE_RESETS_BEFORE_STUCK {
                    return Err(EngineError::StuckRebootRequested);
                }
                Ok(())
            }
            EngineError::FecFailure(_) | EngineError::MalformedPacket(_) => {
                log::debug!("{err}, dropping packet");
                Ok(())
            }
            EngineError::SyncTreeCorrupt(_) => {
                log::error!("{err}");
                Ok(())
            }
            EngineError::GenerationMismatch => Ok(()),
            EngineError::StuckRebootRequested => Err(err),
            EngineError::HttpFailure(_) => {
                log::warn!("{err}");
                Ok(())
            }
        }
    }

    pub fn sleep_ms() -> u64 {
        SLEEP_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbard_radio::{paired, FakeRadioDriver};

    fn options(prefix: u8) -> EngineOptions {
        EngineOptions {
            our_sid_prefix: [prefix; PACKET_SID_PREFIX_LEN],
            our_instance_id: 1,
            congestion_target: 15,
            time_role: TimeRole::Disabled,
            reboot_when_stuck: false,
        }
    }

    #[test]
    fn a_tick_with_no_rx_bytes_does_not_panic() {
        let (driver, _other) = paired();
        let mut engine = Engine::<FakeRadioDriver>::new(driver, options(1), 1);
        engine.tick(0, &[]).unwrap();
    }

    fn sample_bundle(bid_hex: &str) -> crate::bundle::BundleRecord {
        crate::bundle::BundleRecord {
            bid_hex: bid_hex.to_owned(),
            bid_bin: [0x11; 32],
            version: 1,
            length: 10,
            service: "file".to_owned(),
            author: None,
            originated_here: true,
            filehash: "aa".repeat(32),
            sender: None,
            recipient: None,
            sync_key: [0x22; 8],
            last_announced_time_ms: 0,
            last_manifest_offset_announced: 0,
            last_body_offset_announced: 0,
            last_priority: 0,
            num_peers_that_dont_have_it: 0,
            manifest_text: String::new(),
            body: vec![1; 10],
        }
    }

    #[test]
    fn ticking_past_the_interval_emits_a_packet() {
        let (driver, mut other) = paired();
        let mut engine = Engine::<FakeRadioDriver>::new(driver, options(1), 7);
        engine.register_bundle(sample_bundle("aa"));
        let mut now_ms = 0;
        for _ in 0..200 {
            engine.tick(now_ms, &[]).unwrap();
            if !other.receive_bytes(&[]).unwrap().is_empty() {
                return;
            }
            now_ms += 10;
        }
        panic!("no packet emitted within 2 seconds of simulated time");
    }
}
