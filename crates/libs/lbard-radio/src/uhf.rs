//! UHF CSMA driver: `!.`-escaped envelope, `!!` commit,
//! followed by a `0xAA 0x55` magic and a 2-byte big-endian payload length.
//! FEC is a separate concern layered on top by the caller; this module
//! only handles envelope framing.

use crate::driver::{DriverError, DriverKind, RadioDriver, ReceivedPacket};

const ESCAPE: u8 = b'!';
const ESCAPED_LITERAL: u8 = b'.';
const TRAILER_MAGIC: [u8; 2] = [0xAA, 0x55];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Collecting,
    SawBang,
    SawCommit,
    SawMagic1,
    ReadLenHi,
    ReadLenLo(u8),
}

pub struct UhfDriver {
    rx_state: RxState,
    rx_buf: Vec<u8>,
    tx_buf: Vec<u8>,
}

impl UhfDriver {
    pub fn new() -> Self {
        Self { rx_state: RxState::Collecting, rx_buf: Vec::new(), tx_buf: Vec::new() }
    }

    fn reset_rx(&mut self) {
        self.rx_state = RxState::Collecting;
        self.rx_buf.clear();
    }

    fn push_byte(&mut self, byte: u8, out: &mut Vec<ReceivedPacket>) {
        match self.rx_state {
            RxState::Collecting => {
                if byte == ESCAPE {
                    self.rx_state = RxState::SawBang;
                } else {
                    self.rx_buf.push(byte);
                }
            }
            RxState::SawBang => {
                if byte == ESCAPED_LITERAL {
                    self.rx_buf.push(ESCAPE);
                    self.rx_state = RxState::Collecting;
                } else if byte == ESCAPE {
                    self.rx_state = RxState::SawCommit;
                } else {
                    // Neither a valid escape nor a commit: drop the frame.
                    self.reset_rx();
                }
            }
            RxState::SawCommit => {
                if byte == TRAILER_MAGIC[0] {
                    self.rx_state = RxState::SawMagic1;
                } else {
                    self.reset_rx();
                }
            }
            RxState::SawMagic1 => {
                if byte == TRAILER_MAGIC[1] {
                    self.rx_state = RxState::ReadLenHi;
                } else {
                    self.reset_rx();
                }
            }
            RxState::ReadLenHi => {
                self.rx_state = RxState::ReadLenLo(byte);
            }
            RxState::ReadLenLo(hi) => {
                let len = u16::from_be_bytes([hi, byte]) as usize;
                if len == self.rx_buf.len() {
                    out.push(ReceivedPacket { bytes: std::mem::take(&mut self.rx_buf), rssi: None });
                }
                self.reset_rx();
            }
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(payload.len() + 6);
        for &b in payload {
            if b == ESCAPE {
                framed.push(ESCAPE);
                framed.push(ESCAPED_LITERAL);
            } else {
                framed.push(b);
            }
        }
        framed.push(ESCAPE);
        framed.push(ESCAPE);
        framed.extend_from_slice(&TRAILER_MAGIC);
        framed.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        framed
    }
}

impl Default for UhfDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioDriver for UhfDriver {
    fn service_tick(&mut self, _now_ms: u64) {}

    fn receive_bytes(&mut self, buf: &[u8]) -> Result<Vec<ReceivedPacket>, DriverError> {
        let mut out = Vec::new();
        for &byte in buf {
            self.push_byte(byte, &mut out);
        }
        Ok(out)
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DriverError> {
        self.tx_buf.extend(Self::frame(packet));
        Ok(())
    }

    fn drain_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx_buf)
    }

    fn ready_to_send(&self) -> bool {
        true
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Uhf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_plain_payload() {
        let mut driver = UhfDriver::new();
        let payload = b"hello bundle sync";
        driver.send_packet(payload).unwrap();
        let framed = driver.drain_tx();

        let mut rx = UhfDriver::new();
        let packets = rx.receive_bytes(&framed).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].bytes, payload);
    }

    #[test]
    fn escapes_literal_bang_bytes() {
        let mut driver = UhfDriver::new();
        let payload = b"a!b!!c";
        driver.send_packet(payload).unwrap();
        let framed = driver.drain_tx();

        let mut rx = UhfDriver::new();
        let packets = rx.receive_bytes(&framed).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].bytes, payload);
    }

    #[test]
    fn length_mismatch_drops_the_frame() {
        let mut driver = UhfDriver::new();
        driver.send_packet(b"short").unwrap();
        let mut framed = driver.drain_tx();
        // Corrupt the trailing length field so it no longer matches.
        let len_idx = framed.len() - 1;
        framed[len_idx] = 0xFF;

        let mut rx = UhfDriver::new();
        let packets = rx.receive_bytes(&framed).unwrap();
        assert!(packets.is_empty());
    }

    #[test]
    fn split_across_multiple_reads_still_assembles() {
        let mut driver = UhfDriver::new();
        let payload = b"fragmented delivery";
        driver.send_packet(payload).unwrap();
        let framed = driver.drain_tx();

        let mut rx = UhfDriver::new();
        let mid = framed.len() / 2;
        let mut packets = rx.receive_bytes(&framed[..mid]).unwrap();
        packets.extend(rx.receive_bytes(&framed[mid..]).unwrap());
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].bytes, payload);
    }
}
