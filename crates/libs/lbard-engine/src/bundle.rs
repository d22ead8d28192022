//! Bundle record table: the engine's in-memory index of known bundles,
//! mirrored from the store and consulted by the sync tree and scheduler.

use lbard_reassembly::PriorVersionSource;
use lbard_scheduler::BundleSource;
use lbard_store::BundleRow;
use lbard_sync::{derive_sync_key, SyncKey};

pub const MAX_BUNDLES: usize = 4096;
/// Body/manifest size ceilings the store-pull step refuses above.
pub const MAX_BODY_LEN: u64 = 5 * 1024 * 1024;
pub const MAX_MANIFEST_LEN: u64 = 8 * 1024;

#[derive(Debug, Clone)]
pub struct BundleRecord {
    pub bid_hex: String,
    pub bid_bin: [u8; 32],
    pub version: u64,
    pub length: u64,
    pub service: String,
    pub author: Option<String>,
    pub originated_here: bool,
    pub filehash: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub sync_key: SyncKey,
    pub last_announced_time_ms: u64,
    pub last_manifest_offset_announced: u32,
    pub last_body_offset_announced: u64,
    pub last_priority: i64,
    pub num_peers_that_dont_have_it: u32,
    pub manifest_text: String,
    pub body: Vec<u8>,
}

impl BundleRecord {
    pub fn is_journal(&self) -> bool {
        self.service == "MeshMS2"
    }

    /// Builds a record from a parsed store-mirror row plus the manifest
    /// and payload bytes pulled from the Rhizome endpoints named in it
    ///. The manifest is decompressed here so
    /// its text is ready for the outgoing fragment composer without
    /// re-fetching it later.
    pub fn from_store_row(row: &BundleRow, manifest_bytes: &[u8], body: Vec<u8>) -> Option<Self> {
        if row.filesize > MAX_BODY_LEN || manifest_bytes.len() as u64 > MAX_MANIFEST_LEN {
            return None;
        }
        let (manifest_text, _signature_tail) = lbard_manifest::decode_manifest(manifest_bytes).ok()?;
        let bid_bytes = hex::decode(&row.bid_hex).ok()?;
        if bid_bytes.len() != 32 {
            return None;
        }
        let mut bid_bin = [0u8; 32];
        bid_bin.copy_from_slice(&bid_bytes);

        Some(Self {
            bid_hex: row.bid_hex.clone(),
            bid_bin,
            version: row.version,
            length: row.filesize,
            service: row.service.clone(),
            author: row.author.clone(),
            originated_here: row.originated_here,
            filehash: row.filehash.clone(),
            sender: row.sender.clone(),
            recipient: row.recipient.clone(),
            sync_key: derive_sync_key(&row.bid_hex, &row.filehash, row.filesize, row.version),
            last_announced_time_ms: row.insert_time_ms,
            last_manifest_offset_announced: 0,
            last_body_offset_announced: 0,
            last_priority: 0,
            num_peers_that_dont_have_it: 0,
            manifest_text,
            body,
        })
    }
}

#[derive(Default)]
pub struct BundleTable {
    records: Vec<BundleRecord>,
}

impl BundleTable {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_bid(&self, bid_hex: &str) -> Option<&BundleRecord> {
        self.records.iter().find(|b| b.bid_hex == bid_hex)
    }

    pub fn find_by_bid_mut(&mut self, bid_hex: &str) -> Option<&mut BundleRecord> {
        self.records.iter_mut().find(|b| b.bid_hex == bid_hex)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BundleRecord> {
        self.records.iter()
    }

    fn evict_oldest_if_full(&mut self) {
        if self.records.len() < MAX_BUNDLES {
            return;
        }
        if let Some((idx, _)) = self
            .records
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| b.last_announced_time_ms)
        {
            self.records.swap_remove(idx);
        }
    }

    /// Inserts a newly-seen bundle, or updates the record in place if
    /// `version` is newer than what's held.
    /// Returns `true` if the table changed (insert or version bump).
    pub fn register(&mut self, record: BundleRecord) -> bool {
        if let Some(existing) = self.find_by_bid_mut(&record.bid_hex) {
            if record.version > existing.version {
                *existing = record;
                return true;
            }
            return false;
        }
        self.evict_oldest_if_full();
        self.records.push(record);
        true
    }
}

impl BundleSource for BundleTable {
    fn bid_prefix(&self, bundle_index: usize) -> [u8; 8] {
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.records[bundle_index].bid_bin[..8]);
        out
    }

    fn version(&self, bundle_index: usize) -> u64 {
        self.records[bundle_index].version
    }

    fn body_len(&self, bundle_index: usize) -> u64 {
        self.records[bundle_index].length
    }

    fn read_body(&self, bundle_index: usize, offset: u64, max_len: usize) -> Vec<u8> {
        let record = &self.records[bundle_index];
        let start = offset.min(record.body.len() as u64) as usize;
        let end = (start + max_len).min(record.body.len());
        record.body[start..end].to_vec()
    }

    fn manifest_len(&self, bundle_index: usize) -> u64 {
        self.records[bundle_index].manifest_text.len() as u64
    }

    fn read_manifest(&self, bundle_index: usize, offset: u64, max_len: usize) -> Vec<u8> {
        let bytes = self.records[bundle_index].manifest_text.as_bytes();
        let start = offset.min(bytes.len() as u64) as usize;
        let end = (start + max_len).min(bytes.len());
        bytes[start..end].to_vec()
    }
}

impl PriorVersionSource for BundleTable {
    fn fetch_prior_body(&self, bid_prefix: &[u8; 8], new_version: u64) -> Option<Vec<u8>> {
        // This table keeps at most one record per bid (`register` overwrites
        // in place on a version bump), so whatever's here under the same
        // prefix and an older version is the one prior body there is.
        self.records
            .iter()
            .find(|b| b.bid_bin[..8] == bid_prefix[..] && b.version < new_version)
            .map(|b| b.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bid_hex: &str, version: u64) -> BundleRecord {
        BundleRecord {
            bid_hex: bid_hex.to_owned(),
            bid_bin: [0xAA; 32],
            version,
            length: 10,
            service: "file".to_owned(),
            author: None,
            originated_here: true,
            filehash: "ff".repeat(32),
            sender: None,
            recipient: None,
            sync_key: [0; 8],
            last_announced_time_ms: version,
            last_manifest_offset_announced: 0,
            last_body_offset_announced: 0,
            last_priority: 0,
            num_peers_that_dont_have_it: 0,
            manifest_text: String::new(),
            body: vec![1; 10],
        }
    }

    #[test]
    fn register_inserts_new_bundle() {
        let mut table = BundleTable::new();
        assert!(table.register(sample("aa", 1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn register_updates_on_newer_version_only() {
        let mut table = BundleTable::new();
        table.register(sample("aa", 1));
        assert!(!table.register(sample("aa", 1)));
        assert!(table.register(sample("aa", 2)));
        assert_eq!(table.find_by_bid("aa").unwrap().version, 2);
    }

    #[test]
    fn table_stays_bounded_evicting_oldest_announced() {
        let mut table = BundleTable::new();
        for i in 0..(MAX_BUNDLES + 5) {
            table.register(sample(&format!("bid{i}"), i as u64));
        }
        assert_eq!(table.len(), MAX_BUNDLES);
    }

    #[test]
    fn journal_service_is_recognized() {
        let mut record = sample("aa", 1);
        record.service = "MeshMS2".to_owned();
        assert!(record.is_journal());
    }

    #[test]
    fn from_store_row_decodes_the_manifest_and_keeps_the_body() {
        let manifest_bytes = lbard_manifest::encode_manifest("service=file\nname=test\n", b"");
        let row = BundleRow {
            token: "tok".to_owned(),
            service: "file".to_owned(),
            bid_hex: "11".repeat(32),
            version: 5,
            date_ms: 0,
            insert_time_ms: 42,
            author: None,
            originated_here: true,
            filesize: 3,
            filehash: "22".repeat(32),
            sender: None,
            recipient: None,
            name: Some("test".to_owned()),
            bk: None,
        };
        let record = BundleRecord::from_store_row(&row, &manifest_bytes, vec![1, 2, 3]).unwrap();
        assert_eq!(record.manifest_text, "service=file\nname=test\n");
        assert_eq!(record.body, vec![1, 2, 3]);
        assert_eq!(record.last_announced_time_ms, 42);
    }

    #[test]
    fn from_store_row_rejects_oversized_bodies() {
        let manifest_bytes = lbard_manifest::encode_manifest("service=file\n", b"");
        let mut row = BundleRow {
            token: "tok".to_owned(),
            service: "file".to_owned(),
            bid_hex: "11".repeat(32),
            version: 1,
            date_ms: 0,
            insert_time_ms: 0,
            author: None,
            originated_here: true,
            filesize: MAX_BODY_LEN + 1,
            filehash: "22".repeat(32),
            sender: None,
            recipient: None,
            name: None,
            bk: None,
        };
        assert!(BundleRecord::from_store_row(&row, &manifest_bytes, vec![]).is_none());
        row.filesize = 3;
        assert!(BundleRecord::from_store_row(&row, &manifest_bytes, vec![1, 2, 3]).is_some());
    }
}
