//! Binary-prefix sync tree and the sync-key derivation it indexes by.

pub mod key;
pub mod tree;

pub use key::{derive_sync_key, SyncKey, SYNC_KEY_LEN};
pub use tree::{Divergence, SendState, SyncDiff, SyncTree, SyncTreeError};
