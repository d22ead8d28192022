//! Out-of-order, duplicate-tolerant fragment reassembly for in-flight
//! bundles: segment lists, progress bitmaps, and the bounded partial table.

pub mod bitmap;
pub mod partial;
pub mod segment;

pub use bitmap::{derive_body_bitmap, derive_manifest_bitmap, ProgressBitmap, BLOCK_LEN};
pub use partial::{is_journal_version, NoPriorVersions, PartialSlot, PartialTable, PriorVersionSource, MAX_BUNDLES_IN_FLIGHT};
pub use segment::{Segment, SegmentList};
