/// 6-byte sender SID prefix carried in every packet header. This
/// is wider than the 4-byte prefix a `PeerRecord` keys on; the
/// peer table truncates it — see DESIGN.md "wire SID prefix vs peer key".
pub const PACKET_SID_PREFIX_LEN: usize = 6;

/// 4-byte (8 hex char) prefix a `PeerRecord` is keyed by.
pub const PEER_SID_PREFIX_LEN: usize = 4;

pub fn peer_prefix_of(packet_prefix: &[u8; PACKET_SID_PREFIX_LEN]) -> [u8; PEER_SID_PREFIX_LEN] {
    let mut out = [0u8; PEER_SID_PREFIX_LEN];
    out.copy_from_slice(&packet_prefix[..PEER_SID_PREFIX_LEN]);
    out
}

pub fn sid_prefix_from_hex(hex_str: &str) -> Option<[u8; PACKET_SID_PREFIX_LEN]> {
    let bytes = hex::decode(hex_str).ok()?;
    if bytes.len() < PACKET_SID_PREFIX_LEN {
        return None;
    }
    let mut out = [0u8; PACKET_SID_PREFIX_LEN];
    out.copy_from_slice(&bytes[..PACKET_SID_PREFIX_LEN]);
    Some(out)
}

pub fn sid_prefix_to_hex(prefix: &[u8; PACKET_SID_PREFIX_LEN]) -> String {
    hex::encode(prefix)
}
