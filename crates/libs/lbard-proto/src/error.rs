use thiserror::Error;

/// Malformed-packet taxonomy from the error handling design: an unknown type
/// byte, a truncated field, or an out-of-range length all abort parsing of
/// the *rest* of the packet but never the fields already decoded.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtoError {
    #[error("unknown field type byte 0x{0:02x}")]
    UnknownFieldType(u8),
    #[error("field truncated: wanted {wanted} bytes, had {had}")]
    Truncated { wanted: usize, had: usize },
    #[error("field length out of range: {0}")]
    LengthOutOfRange(usize),
    #[error("packet shorter than header (8 bytes)")]
    HeaderTooShort,
}
