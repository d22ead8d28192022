//! Manifest compression with mandatory round-trip verification.

use thiserror::Error;

use crate::fields::{field_for_token, token_for, FieldKind, LITERAL_LINE_TOKEN};
use crate::varint;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("truncated manifest body")]
    Truncated,
    #[error("unknown field token 0x{0:02x}")]
    UnknownToken(u8),
    #[error("field value is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown wire marker 0x{0:02x}")]
    UnknownMarker(u8),
}

const MARKER_COMPRESSED: u8 = 0x01;
const MARKER_RAW: u8 = 0x02;

/// Splits a plaintext manifest as read from the store into its key=value
/// text and opaque signature tail, which begins at the first NUL byte.
/// Text manifests never otherwise contain NUL, so this is unambiguous —
/// unlike our own compressed wire encoding, which legitimately uses 0x00
/// as the literal-line token and therefore length-prefixes instead.
pub fn split_signature_tail(raw: &[u8]) -> (&str, &[u8]) {
    match raw.iter().position(|&b| b == 0) {
        Some(pos) => (std::str::from_utf8(&raw[..pos]).unwrap_or(""), &raw[pos + 1..]),
        None => (std::str::from_utf8(raw).unwrap_or(""), &[]),
    }
}

fn compress_line(line: &str, out: &mut Vec<u8>) {
    let literal = |out: &mut Vec<u8>| {
        out.push(LITERAL_LINE_TOKEN);
        varint::encode(line.len() as u64, out);
        out.extend_from_slice(line.as_bytes());
    };

    let Some((key, value)) = line.split_once('=') else {
        literal(out);
        return;
    };
    let Some((token, kind)) = token_for(key) else {
        literal(out);
        return;
    };

    let mut encoded = Vec::new();
    let fits = match kind {
        FieldKind::Text => {
            varint::encode(value.len() as u64, &mut encoded);
            encoded.extend_from_slice(value.as_bytes());
            true
        }
        FieldKind::Varint => match value.parse::<u64>() {
            Ok(v) => {
                varint::encode(v, &mut encoded);
                true
            }
            Err(_) => false,
        },
        FieldKind::Flag => match value {
            "0" => {
                encoded.push(0);
                true
            }
            "1" => {
                encoded.push(1);
                true
            }
            _ => false,
        },
        FieldKind::HexId => match hex::decode(value) {
            Ok(bytes) if bytes.len() == 32 => {
                encoded.extend_from_slice(&bytes);
                true
            }
            _ => false,
        },
    };

    if fits {
        out.push(token);
        out.extend(encoded);
    } else {
        literal(out);
    }
}

fn decompress_line(bytes: &[u8], pos: &mut usize) -> Result<String, ManifestError> {
    let token = *bytes.get(*pos).ok_or(ManifestError::Truncated)?;
    *pos += 1;
    if token == LITERAL_LINE_TOKEN {
        let (len, consumed) = varint::decode(&bytes[*pos..]).ok_or(ManifestError::Truncated)?;
        *pos += consumed;
        let len = len as usize;
        let slice = bytes.get(*pos..*pos + len).ok_or(ManifestError::Truncated)?;
        *pos += len;
        return std::str::from_utf8(slice).map(str::to_owned).map_err(|_| ManifestError::InvalidUtf8);
    }

    let (key, kind) = field_for_token(token).ok_or(ManifestError::UnknownToken(token))?;
    let value = match kind {
        FieldKind::Text => {
            let (len, consumed) = varint::decode(&bytes[*pos..]).ok_or(ManifestError::Truncated)?;
            *pos += consumed;
            let len = len as usize;
            let slice = bytes.get(*pos..*pos + len).ok_or(ManifestError::Truncated)?;
            *pos += len;
            std::str::from_utf8(slice).map(str::to_owned).map_err(|_| ManifestError::InvalidUtf8)?
        }
        FieldKind::Varint => {
            let (value, consumed) = varint::decode(&bytes[*pos..]).ok_or(ManifestError::Truncated)?;
            *pos += consumed;
            value.to_string()
        }
        FieldKind::Flag => {
            let byte = *bytes.get(*pos).ok_or(ManifestError::Truncated)?;
            *pos += 1;
            if byte == 0 { "0".to_owned() } else { "1".to_owned() }
        }
        FieldKind::HexId => {
            let slice = bytes.get(*pos..*pos + 32).ok_or(ManifestError::Truncated)?;
            *pos += 32;
            hex::encode(slice)
        }
    };
    Ok(format!("{key}={value}"))
}

fn compress_lines(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for line in text.lines() {
        compress_line(line, &mut out);
    }
    out
}

fn decompress_lines(bytes: &[u8]) -> Result<String, ManifestError> {
    let mut pos = 0;
    let mut lines = Vec::new();
    while pos < bytes.len() {
        lines.push(decompress_line(bytes, &mut pos)?);
    }
    Ok(lines.join("\n"))
}

/// Compresses `manifest_text` and appends `signature_tail`, verifying the
/// compressed form round-trips bytewise back to the original text first.
/// Falls back to carrying the manifest uncompressed when it doesn't, so a
/// signature computed over the original text is never invalidated.
pub fn encode_manifest(manifest_text: &str, signature_tail: &[u8]) -> Vec<u8> {
    let compressed = compress_lines(manifest_text);
    let round_trips = decompress_lines(&compressed).as_deref() == Ok(manifest_text);

    let mut out = Vec::new();
    if round_trips {
        out.push(MARKER_COMPRESSED);
        varint::encode(compressed.len() as u64, &mut out);
        out.extend(compressed);
    } else {
        out.push(MARKER_RAW);
        varint::encode(manifest_text.len() as u64, &mut out);
        out.extend_from_slice(manifest_text.as_bytes());
    }
    out.extend_from_slice(signature_tail);
    out
}

pub fn decode_manifest(bytes: &[u8]) -> Result<(String, Vec<u8>), ManifestError> {
    let marker = *bytes.first().ok_or(ManifestError::Truncated)?;
    let (body_len, consumed) = varint::decode(&bytes[1..]).ok_or(ManifestError::Truncated)?;
    let body_start = 1 + consumed;
    let body_len = body_len as usize;
    let body = bytes.get(body_start..body_start + body_len).ok_or(ManifestError::Truncated)?;
    let tail = bytes[body_start + body_len..].to_vec();

    let text = match marker {
        MARKER_COMPRESSED => decompress_lines(body)?,
        MARKER_RAW => std::str::from_utf8(body).map(str::to_owned).map_err(|_| ManifestError::InvalidUtf8)?,
        other => return Err(ManifestError::UnknownMarker(other)),
    };
    Ok((text, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fields_round_trip_compressed() {
        let text = "service=file\nid=aa11bb22cc33dd44ee55ff6600112233445566778899aabbccddeeff0011\nversion=5\nfilesize=1024\ncrypt=1\nname=hello.txt";
        let id_line_hex = hex::encode([0xAAu8; 32]);
        let text = text.replace("aa11bb22cc33dd44ee55ff6600112233445566778899aabbccddeeff0011", &id_line_hex);
        let wire = encode_manifest(&text, b"sigtail");
        assert_eq!(wire[0], MARKER_COMPRESSED);
        let (decoded_text, tail) = decode_manifest(&wire).unwrap();
        assert_eq!(decoded_text, text);
        assert_eq!(tail, b"sigtail");
    }

    #[test]
    fn unknown_key_falls_back_per_line_not_whole_manifest() {
        let text = "service=file\nexotic-field=surprise\nversion=2";
        let wire = encode_manifest(text, b"");
        assert_eq!(wire[0], MARKER_COMPRESSED); // still compressed overall
        let (decoded, _) = decode_manifest(&wire).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn malformed_known_field_value_falls_back_to_literal_line() {
        let text = "version=not-a-number";
        let wire = encode_manifest(text, b"");
        let (decoded, _) = decode_manifest(&wire).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn split_signature_tail_finds_first_nul() {
        let mut raw = b"service=file\nversion=1".to_vec();
        raw.push(0);
        raw.extend_from_slice(b"\x01\x02\x03signature");
        let (text, tail) = split_signature_tail(&raw);
        assert_eq!(text, "service=file\nversion=1");
        assert_eq!(tail, b"\x01\x02\x03signature");
    }

    #[test]
    fn empty_manifest_round_trips() {
        let wire = encode_manifest("", b"");
        let (text, tail) = decode_manifest(&wire).unwrap();
        assert_eq!(text, "");
        assert!(tail.is_empty());
    }
}
