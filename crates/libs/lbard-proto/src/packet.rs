//! Packet framing: an 8-byte header followed by a run of fields.
//!
//! A malformed field aborts parsing of everything *after* it, but every
//! field decoded before the failure is kept — a packet that is good for its
//! first half and garbled in its second still delivers the good half.

use crate::error::ProtoError;
use crate::fields::Field;

pub const MAGIC: u8 = 0xE5;
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 8;
pub const SENDER_PREFIX_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub sender_prefix: [u8; SENDER_PREFIX_LEN],
}

impl PacketHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(MAGIC);
        out.push(self.version);
        out.extend_from_slice(&self.sender_prefix);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtoError::HeaderTooShort);
        }
        let mut sender_prefix = [0u8; SENDER_PREFIX_LEN];
        sender_prefix.copy_from_slice(&bytes[2..8]);
        Ok(Self { version: bytes[1], sender_prefix })
    }
}

/// A packet decoded as far as it could be. `trailing_error` is set when a
/// field past `fields` failed to parse; `fields` up to that point are still
/// usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub header: PacketHeader,
    pub fields: Vec<Field>,
    pub trailing_error: Option<ProtoError>,
}

pub fn encode_packet(header: &PacketHeader, fields: &[Field]) -> Vec<u8> {
    let mut out = Vec::new();
    header.encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }
    out
}

pub fn decode_packet(bytes: &[u8]) -> Result<DecodedPacket, ProtoError> {
    if bytes.first() != Some(&MAGIC) {
        return Err(ProtoError::HeaderTooShort);
    }
    let header = PacketHeader::decode(bytes)?;
    let mut fields = Vec::new();
    let mut pos = HEADER_LEN;
    let mut trailing_error = None;
    while pos < bytes.len() {
        match Field::decode(&bytes[pos..]) {
            Ok((field, consumed)) => {
                fields.push(field);
                pos += consumed;
            }
            Err(err) => {
                trailing_error = Some(err);
                break;
            }
        }
    }
    Ok(DecodedPacket { header, fields, trailing_error })
}
