/// A stratum-tagged wall clock reading, carried on the wire by the `T` field.
///
/// Stratum is the integer time-authority distance described in the
/// glossary: 0 means "we are the authority", and it increases by one at
/// every hop away from a trusted clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbardTime {
    pub stratum: u8,
    pub seconds: u64,
    pub micros: u32,
}

impl LbardTime {
    pub const WIRE_LEN: usize = 12;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.stratum);
        out.extend_from_slice(&self.seconds.to_le_bytes());
        out.extend_from_slice(&self.micros.to_le_bytes()[..3]);
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_LEN {
            return None;
        }
        let stratum = bytes[0];
        let mut seconds_buf = [0u8; 8];
        seconds_buf.copy_from_slice(&bytes[1..9]);
        let seconds = u64::from_le_bytes(seconds_buf);
        let mut micros_buf = [0u8; 4];
        micros_buf[..3].copy_from_slice(&bytes[9..12]);
        let micros = u32::from_le_bytes(micros_buf);
        Some(Self { stratum, seconds, micros })
    }

    /// Serial-to-radio transit correction applied by a time slave, per the
    /// original source's comment on UHF serial + air time: ~10.8ms serial +
    /// ~15.6ms radio TX for a 250-byte packet at 230400bps/128000bps.
    pub const SERIAL_RADIO_TRANSIT_CORRECTION_MS: u64 = 26;

    pub fn corrected_for_transit(mut self) -> Self {
        let extra_micros = Self::SERIAL_RADIO_TRANSIT_CORRECTION_MS * 1000;
        self.micros += extra_micros as u32 % 1_000_000;
        self.seconds += self.micros as u64 / 1_000_000;
        self.micros %= 1_000_000;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let t = LbardTime { stratum: 2, seconds: 1_700_000_000, micros: 123_456 };
        let mut buf = Vec::new();
        t.encode(&mut buf);
        assert_eq!(buf.len(), LbardTime::WIRE_LEN);
        assert_eq!(LbardTime::decode(&buf), Some(t));
    }

    #[test]
    fn rejects_short() {
        assert_eq!(LbardTime::decode(&[1, 2, 3]), None);
    }
}
