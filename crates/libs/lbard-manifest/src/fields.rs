//! Known manifest field table, grounded on the field names the
//! original source's manifest parser recognises.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A 64-hex-char value representing 32 raw bytes (a hash or SID).
    HexId,
    /// A non-negative integer, encoded as an unsigned LEB128 varint.
    Varint,
    /// A single `0`/`1` flag byte.
    Flag,
    /// Free-form text, length-prefixed.
    Text,
}

pub const LITERAL_LINE_TOKEN: u8 = 0x00;
pub const KNOWN_FIELD_BASE: u8 = 0x80;

pub const KNOWN_FIELDS: &[(&str, FieldKind)] = &[
    ("service", FieldKind::Text),
    ("id", FieldKind::HexId),
    ("version", FieldKind::Varint),
    ("filesize", FieldKind::Varint),
    ("filehash", FieldKind::HexId),
    ("sender", FieldKind::HexId),
    ("recipient", FieldKind::HexId),
    ("BK", FieldKind::HexId),
    ("crypt", FieldKind::Flag),
    ("tail", FieldKind::Text),
    ("date", FieldKind::Varint),
    ("name", FieldKind::Text),
];

pub fn token_for(key: &str) -> Option<(u8, FieldKind)> {
    KNOWN_FIELDS
        .iter()
        .position(|(name, _)| *name == key)
        .map(|idx| (KNOWN_FIELD_BASE + idx as u8, KNOWN_FIELDS[idx].1))
}

pub fn field_for_token(token: u8) -> Option<(&'static str, FieldKind)> {
    let idx = token.checked_sub(KNOWN_FIELD_BASE)? as usize;
    KNOWN_FIELDS.get(idx).map(|(name, kind)| (*name, *kind))
}
