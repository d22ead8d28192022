//! Packet field records.
//!
//! Every outgoing packet is a run of type-byte-led records. Field widths
//! here follow the wire format byte-for-byte (bid prefixes are always the
//! full 8 bytes except where a record is explicitly keyed by a shorter
//! peer/recipient prefix). All multi-byte integers are little-endian.

use crate::error::ProtoError;
use crate::time::LbardTime;

pub const TYPE_TIME: u8 = b'T';
pub const TYPE_GENERATION: u8 = b'G';
pub const TYPE_SYNC: u8 = b'S';
pub const TYPE_BAR: u8 = b'B';
pub const TYPE_LENGTH: u8 = b'L';
pub const TYPE_MANIFEST_FRAGMENT: u8 = b'p';
pub const TYPE_MANIFEST_FRAGMENT_END: u8 = b'P';
pub const TYPE_BODY_FRAGMENT: u8 = b'q';
pub const TYPE_BODY_FRAGMENT_END: u8 = b'Q';
pub const TYPE_REQUEST: u8 = b'R';
pub const TYPE_ACK: u8 = b'A';
pub const TYPE_BITMAP: u8 = b'M';

/// Offsets at or above this boundary need the capital `P`/`Q` wide-offset
/// form: the 1 MiB mark past which a 3-byte offset can no longer address
/// the fragment's start.
pub const WIDE_OFFSET_THRESHOLD: u64 = 0x0F_FFFF;

pub const SYNC_RECORD_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRecord {
    pub min_prefix_len: u8,
    pub prefix_len: u8,
    pub key: [u8; 8],
}

impl SyncRecord {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.min_prefix_len);
        out.push(self.prefix_len);
        out.extend_from_slice(&self.key);
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SYNC_RECORD_LEN {
            return None;
        }
        let mut key = [0u8; 8];
        key.copy_from_slice(&bytes[2..10]);
        Some(Self { min_prefix_len: bytes[0], prefix_len: bytes[1], key })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarRecord {
    pub bid_prefix: [u8; 8],
    pub version: u64,
    pub recipient_prefix: [u8; 4],
    pub size_class: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthRecord {
    pub bid_prefix: [u8; 8],
    pub version: u64,
    pub body_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentStream {
    Manifest,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRecord {
    pub stream: FragmentStream,
    pub end_of_stream: bool,
    pub bid_prefix: [u8; 8],
    pub version: u64,
    pub start_offset: u64,
    pub flags: u8,
    pub data: Vec<u8>,
}

impl FragmentRecord {
    pub fn type_byte(&self) -> u8 {
        match (self.stream, self.end_of_stream) {
            (FragmentStream::Manifest, false) => TYPE_MANIFEST_FRAGMENT,
            (FragmentStream::Manifest, true) => TYPE_MANIFEST_FRAGMENT_END,
            (FragmentStream::Body, false) => TYPE_BODY_FRAGMENT,
            (FragmentStream::Body, true) => TYPE_BODY_FRAGMENT_END,
        }
    }

    pub fn is_wide_offset(&self) -> bool {
        self.start_offset > WIDE_OFFSET_THRESHOLD
    }

    fn header_len(&self) -> usize {
        if self.is_wide_offset() {
            25
        } else {
            23
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.type_byte());
        out.extend_from_slice(&self.bid_prefix);
        out.extend_from_slice(&self.version.to_le_bytes());
        let offset_width = if self.is_wide_offset() { 5 } else { 3 };
        let offset_bytes = self.start_offset.to_le_bytes();
        out.extend_from_slice(&offset_bytes[..offset_width]);
        out.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        out.push(self.flags);
        out.extend_from_slice(&self.data);
    }

    /// Decodes a fragment whose type byte has already been consumed.
    /// `wide` must match the capital/lowercase form implied by the type byte.
    pub fn decode(
        stream: FragmentStream,
        end_of_stream: bool,
        wide: bool,
        body: &[u8],
    ) -> Result<(Self, usize), ProtoError> {
        let fixed_len = if wide { 24 } else { 22 };
        if body.len() < fixed_len {
            return Err(ProtoError::Truncated { wanted: fixed_len, had: body.len() });
        }
        let mut bid_prefix = [0u8; 8];
        bid_prefix.copy_from_slice(&body[0..8]);
        let mut version_buf = [0u8; 8];
        version_buf.copy_from_slice(&body[8..16]);
        let version = u64::from_le_bytes(version_buf);
        let offset_width = if wide { 5 } else { 3 };
        let offset_end = 16 + offset_width;
        let mut offset_buf = [0u8; 8];
        offset_buf[..offset_width].copy_from_slice(&body[16..offset_end]);
        let start_offset = u64::from_le_bytes(offset_buf);
        let len_end = offset_end + 2;
        let data_len = u16::from_le_bytes([body[offset_end], body[offset_end + 1]]) as usize;
        let flags = body[len_end];
        let data_start = len_end + 1;
        let data_end = data_start + data_len;
        if body.len() < data_end {
            return Err(ProtoError::Truncated { wanted: data_end, had: body.len() });
        }
        Ok((
            Self {
                stream,
                end_of_stream,
                bid_prefix,
                version,
                start_offset,
                flags,
                data: body[data_start..data_end].to_vec(),
            },
            1 + data_end,
        ))
    }

    pub fn total_len(&self) -> usize {
        1 + self.header_len() + self.data.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    pub recipient_prefix: [u8; 4],
    pub bid_prefix: [u8; 8],
    pub block_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    pub bid_prefix: [u8; 8],
    pub manifest_offset: u16,
    pub body_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapRecord {
    pub bid_prefix: [u8; 4],
    pub base_offset: u32,
    pub bitmap: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Time(LbardTime),
    Generation(u32),
    Sync(Vec<SyncRecord>),
    Bar(BarRecord),
    Length(LengthRecord),
    Fragment(FragmentRecord),
    Request(RequestRecord),
    Ack(AckRecord),
    Bitmap(BitmapRecord),
}

impl Field {
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Field::Time(t) => {
                out.push(TYPE_TIME);
                t.encode(out);
            }
            Field::Generation(g) => {
                out.push(TYPE_GENERATION);
                out.extend_from_slice(&g.to_le_bytes());
            }
            Field::Sync(records) => {
                out.push(TYPE_SYNC);
                out.push((records.len() * SYNC_RECORD_LEN) as u8);
                for r in records {
                    r.encode(out);
                }
            }
            Field::Bar(b) => {
                out.push(TYPE_BAR);
                out.extend_from_slice(&b.bid_prefix);
                out.extend_from_slice(&b.version.to_le_bytes());
                out.extend_from_slice(&b.recipient_prefix);
                out.push(b.size_class);
            }
            Field::Length(l) => {
                out.push(TYPE_LENGTH);
                out.extend_from_slice(&l.bid_prefix);
                out.extend_from_slice(&l.version.to_le_bytes());
                out.extend_from_slice(&l.body_length.to_le_bytes());
            }
            Field::Fragment(f) => f.encode(out),
            Field::Request(r) => {
                out.push(TYPE_REQUEST);
                out.extend_from_slice(&r.recipient_prefix);
                out.extend_from_slice(&r.bid_prefix);
                out.push(r.block_index);
            }
            Field::Ack(a) => {
                out.push(TYPE_ACK);
                out.extend_from_slice(&a.bid_prefix);
                out.extend_from_slice(&a.manifest_offset.to_le_bytes());
                out.extend_from_slice(&a.body_offset.to_le_bytes());
            }
            Field::Bitmap(m) => {
                out.push(TYPE_BITMAP);
                out.extend_from_slice(&m.bid_prefix);
                out.extend_from_slice(&m.base_offset.to_le_bytes());
                out.push(m.bitmap.len() as u8);
                out.extend_from_slice(&m.bitmap);
            }
        }
    }

    /// Decodes one field starting at `bytes[0]` (the type byte). Returns the
    /// field and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Field, usize), ProtoError> {
        if bytes.is_empty() {
            return Err(ProtoError::Truncated { wanted: 1, had: 0 });
        }
        let type_byte = bytes[0];
        let body = &bytes[1..];
        match type_byte {
            TYPE_TIME => {
                let t = LbardTime::decode(body)
                    .ok_or(ProtoError::Truncated { wanted: LbardTime::WIRE_LEN, had: body.len() })?;
                Ok((Field::Time(t), 1 + LbardTime::WIRE_LEN))
            }
            TYPE_GENERATION => {
                if body.len() < 4 {
                    return Err(ProtoError::Truncated { wanted: 4, had: body.len() });
                }
                let g = u32::from_le_bytes(body[0..4].try_into().unwrap());
                Ok((Field::Generation(g), 5))
            }
            TYPE_SYNC => {
                if body.is_empty() {
                    return Err(ProtoError::Truncated { wanted: 1, had: 0 });
                }
                let field_len = body[0] as usize;
                if field_len > 64 || field_len % SYNC_RECORD_LEN != 0 {
                    return Err(ProtoError::LengthOutOfRange(field_len));
                }
                if body.len() < 1 + field_len {
                    return Err(ProtoError::Truncated { wanted: 1 + field_len, had: body.len() });
                }
                let mut records = Vec::with_capacity(field_len / SYNC_RECORD_LEN);
                let mut pos = 1;
                while pos < 1 + field_len {
                    let rec = SyncRecord::decode(&body[pos..]).ok_or(ProtoError::Truncated {
                        wanted: SYNC_RECORD_LEN,
                        had: body.len() - pos,
                    })?;
                    if rec.min_prefix_len > 64 || rec.prefix_len > 64 {
                        return Err(ProtoError::LengthOutOfRange(rec.prefix_len as usize));
                    }
                    records.push(rec);
                    pos += SYNC_RECORD_LEN;
                }
                Ok((Field::Sync(records), 1 + 1 + field_len))
            }
            TYPE_BAR => {
                if body.len() < 21 {
                    return Err(ProtoError::Truncated { wanted: 21, had: body.len() });
                }
                let mut bid_prefix = [0u8; 8];
                bid_prefix.copy_from_slice(&body[0..8]);
                let version = u64::from_le_bytes(body[8..16].try_into().unwrap());
                let mut recipient_prefix = [0u8; 4];
                recipient_prefix.copy_from_slice(&body[16..20]);
                let size_class = body[20];
                Ok((
                    Field::Bar(BarRecord { bid_prefix, version, recipient_prefix, size_class }),
                    22,
                ))
            }
            TYPE_LENGTH => {
                if body.len() < 20 {
                    return Err(ProtoError::Truncated { wanted: 20, had: body.len() });
                }
                let mut bid_prefix = [0u8; 8];
                bid_prefix.copy_from_slice(&body[0..8]);
                let version = u64::from_le_bytes(body[8..16].try_into().unwrap());
                let body_length = u32::from_le_bytes(body[16..20].try_into().unwrap());
                Ok((Field::Length(LengthRecord { bid_prefix, version, body_length }), 21))
            }
            TYPE_MANIFEST_FRAGMENT | TYPE_MANIFEST_FRAGMENT_END | TYPE_BODY_FRAGMENT
            | TYPE_BODY_FRAGMENT_END => {
                let stream = if matches!(type_byte, TYPE_MANIFEST_FRAGMENT | TYPE_MANIFEST_FRAGMENT_END)
                {
                    FragmentStream::Manifest
                } else {
                    FragmentStream::Body
                };
                let end_of_stream =
                    matches!(type_byte, TYPE_MANIFEST_FRAGMENT_END | TYPE_BODY_FRAGMENT_END);
                let wide = type_byte.is_ascii_uppercase();
                let (frag, consumed) = FragmentRecord::decode(stream, end_of_stream, wide, body)?;
                Ok((Field::Fragment(frag), consumed))
            }
            TYPE_REQUEST => {
                if body.len() < 13 {
                    return Err(ProtoError::Truncated { wanted: 13, had: body.len() });
                }
                let mut recipient_prefix = [0u8; 4];
                recipient_prefix.copy_from_slice(&body[0..4]);
                let mut bid_prefix = [0u8; 8];
                bid_prefix.copy_from_slice(&body[4..12]);
                let block_index = body[12];
                Ok((Field::Request(RequestRecord { recipient_prefix, bid_prefix, block_index }), 14))
            }
            TYPE_ACK => {
                if body.len() < 14 {
                    return Err(ProtoError::Truncated { wanted: 14, had: body.len() });
                }
                let mut bid_prefix = [0u8; 8];
                bid_prefix.copy_from_slice(&body[0..8]);
                let manifest_offset = u16::from_le_bytes(body[8..10].try_into().unwrap());
                let body_offset = u32::from_le_bytes(body[10..14].try_into().unwrap());
                Ok((Field::Ack(AckRecord { bid_prefix, manifest_offset, body_offset }), 15))
            }
            TYPE_BITMAP => {
                if body.len() < 9 {
                    return Err(ProtoError::Truncated { wanted: 9, had: body.len() });
                }
                let mut bid_prefix = [0u8; 4];
                bid_prefix.copy_from_slice(&body[0..4]);
                let base_offset = u32::from_le_bytes(body[4..8].try_into().unwrap());
                let bitmap_len = body[8] as usize;
                if body.len() < 9 + bitmap_len {
                    return Err(ProtoError::Truncated { wanted: 9 + bitmap_len, had: body.len() });
                }
                let bitmap = body[9..9 + bitmap_len].to_vec();
                Ok((Field::Bitmap(BitmapRecord { bid_prefix, base_offset, bitmap }), 1 + 9 + bitmap_len))
            }
            other => Err(ProtoError::UnknownFieldType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(field: Field) {
        let mut buf = Vec::new();
        field.encode(&mut buf);
        let (decoded, consumed) = Field::decode(&buf).expect("decode");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, field);
    }

    #[test]
    fn time_roundtrip() {
        roundtrip(Field::Time(LbardTime { stratum: 1, seconds: 42, micros: 500 }));
    }

    #[test]
    fn generation_roundtrip() {
        roundtrip(Field::Generation(0xDEADBEEF));
    }

    #[test]
    fn sync_roundtrip() {
        roundtrip(Field::Sync(vec![
            SyncRecord { min_prefix_len: 0, prefix_len: 1, key: [1; 8] },
            SyncRecord { min_prefix_len: 1, prefix_len: 64, key: [2; 8] },
        ]));
    }

    #[test]
    fn bar_roundtrip() {
        roundtrip(Field::Bar(BarRecord {
            bid_prefix: [0xAA; 8],
            version: 7,
            recipient_prefix: [1, 2, 3, 4],
            size_class: 2,
        }));
    }

    #[test]
    fn length_roundtrip() {
        roundtrip(Field::Length(LengthRecord { bid_prefix: [1; 8], version: 3, body_length: 100 }));
    }

    #[test]
    fn narrow_fragment_roundtrip() {
        roundtrip(Field::Fragment(FragmentRecord {
            stream: FragmentStream::Body,
            end_of_stream: false,
            bid_prefix: [9; 8],
            version: 1,
            start_offset: 128,
            flags: 0,
            data: vec![1, 2, 3, 4],
        }));
    }

    #[test]
    fn wide_fragment_at_1mib_boundary_uses_capital_form() {
        let frag = FragmentRecord {
            stream: FragmentStream::Body,
            end_of_stream: true,
            bid_prefix: [1; 8],
            version: 1,
            start_offset: WIDE_OFFSET_THRESHOLD + 1,
            flags: 0,
            data: vec![5, 6],
        };
        assert_eq!(frag.type_byte(), TYPE_BODY_FRAGMENT_END);
        assert!(frag.is_wide_offset());
        roundtrip(Field::Fragment(frag));
    }

    #[test]
    fn below_boundary_uses_lowercase_form() {
        let frag = FragmentRecord {
            stream: FragmentStream::Manifest,
            end_of_stream: false,
            bid_prefix: [1; 8],
            version: 1,
            start_offset: WIDE_OFFSET_THRESHOLD,
            flags: 0,
            data: vec![],
        };
        assert_eq!(frag.type_byte(), TYPE_MANIFEST_FRAGMENT);
        assert!(!frag.is_wide_offset());
    }

    #[test]
    fn request_roundtrip() {
        roundtrip(Field::Request(RequestRecord {
            recipient_prefix: [1, 2, 3, 4],
            bid_prefix: [5; 8],
            block_index: 9,
        }));
    }

    #[test]
    fn ack_roundtrip() {
        roundtrip(Field::Ack(AckRecord {
            bid_prefix: [1, 2, 3, 4, 5, 6, 7, 8],
            manifest_offset: 1024,
            body_offset: 4096,
        }));
    }

    #[test]
    fn bitmap_roundtrip() {
        roundtrip(Field::Bitmap(BitmapRecord {
            bid_prefix: [1, 2, 3, 4],
            base_offset: 64,
            bitmap: vec![0xFF; 32],
        }));
    }

    #[test]
    fn unknown_type_aborts_cleanly() {
        let err = Field::decode(&[0xFE, 1, 2, 3]).unwrap_err();
        assert_eq!(err, ProtoError::UnknownFieldType(0xFE));
    }

    #[test]
    fn sync_field_rejects_oversize_prefix_len() {
        let mut buf = vec![TYPE_SYNC, SYNC_RECORD_LEN as u8];
        buf.push(0);
        buf.push(65); // prefix_len > 64
        buf.extend_from_slice(&[0u8; 8]);
        assert!(matches!(Field::decode(&buf), Err(ProtoError::LengthOutOfRange(_))));
    }
}
