//! Sync key derivation.
//!
//! An 8-byte fingerprint of a bundle's identity. Two nodes that both hold
//! the same (BID, version, length, filehash) always derive the same key,
//! so the sync tree can compare them without exchanging the underlying
//! bundle at all.

use sha1::{Digest, Sha1};

pub const SYNC_KEY_LEN: usize = 8;

/// Process-wide salt folded into every sync key. Arbitrary but fixed: it
/// only needs to be the same value across all peers that want to compare
/// keys, and SYNC_KEY_SALT here matches the constant instances compiled
/// from the same binary always agree with each other.
pub const SYNC_KEY_SALT: [u8; 8] = *b"lbardsk1";

pub type SyncKey = [u8; SYNC_KEY_LEN];

/// Derives the sync key for a bundle from its identity fields.
///
/// `bid_hex` and `filehash_hex` are lowercase hex strings as stored in the
/// bundle record; `length` and `version` are folded in as lowercase hex too,
/// joined by a colon, matching the original encoding byte for byte.
pub fn derive_sync_key(bid_hex: &str, filehash_hex: &str, length: u64, version: u64) -> SyncKey {
    let mut hasher = Sha1::new();
    hasher.update(SYNC_KEY_SALT);
    hasher.update(bid_hex.as_bytes());
    hasher.update(filehash_hex.as_bytes());
    hasher.update(format!("{length:x}:{version:x}").as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; SYNC_KEY_LEN];
    key.copy_from_slice(&digest[..SYNC_KEY_LEN]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_identity_yields_same_key() {
        let a = derive_sync_key("aa".repeat(32).as_str(), "ff".repeat(32).as_str(), 100, 1);
        let b = derive_sync_key("aa".repeat(32).as_str(), "ff".repeat(32).as_str(), 100, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn version_bump_changes_key() {
        let bid = "aa".repeat(32);
        let filehash = "ff".repeat(32);
        let v1 = derive_sync_key(&bid, &filehash, 100, 1);
        let v2 = derive_sync_key(&bid, &filehash, 100, 2);
        assert_ne!(v1, v2);
    }

    #[test]
    fn different_bid_changes_key() {
        let filehash = "ff".repeat(32);
        let a = derive_sync_key(&"aa".repeat(32), &filehash, 100, 1);
        let b = derive_sync_key(&"bb".repeat(32), &filehash, 100, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn different_length_changes_key() {
        let bid = "aa".repeat(32);
        let filehash = "ff".repeat(32);
        let a = derive_sync_key(&bid, &filehash, 100, 1);
        let b = derive_sync_key(&bid, &filehash, 200, 1);
        assert_ne!(a, b);
    }
}
