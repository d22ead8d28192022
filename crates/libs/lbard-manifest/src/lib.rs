//! Token-compressed manifest codec: known key=value fields
//! compress to a single leading byte, with a mandatory round-trip check
//! and a verbatim fallback so a manifest's signature is never invalidated.

pub mod codec;
pub mod fields;
pub mod varint;

pub use codec::{decode_manifest, encode_manifest, split_signature_tail, ManifestError};
pub use fields::{FieldKind, KNOWN_FIELDS};
