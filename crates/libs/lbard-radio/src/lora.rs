//! LoRa driver: hex-encoded payloads sent through a
//! `mac pause` / `radio tx` / `radio rx 0` AT-command cycle, as exposed by
//! RN2483-style LoRaWAN modules running in raw radio mode.

use crate::driver::{DriverError, DriverKind, RadioDriver, ReceivedPacket};

pub struct LoRaDriver {
    rx_line_buf: Vec<u8>,
    tx_buf: Vec<u8>,
    awaiting_rx_window_reopen: bool,
}

impl LoRaDriver {
    pub fn new() -> Self {
        Self { rx_line_buf: Vec::new(), tx_buf: Vec::new(), awaiting_rx_window_reopen: false }
    }
}

impl Default for LoRaDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioDriver for LoRaDriver {
    fn service_tick(&mut self, _now_ms: u64) {
        if self.awaiting_rx_window_reopen {
            self.tx_buf.extend_from_slice(b"radio rx 0\r\n");
            self.awaiting_rx_window_reopen = false;
        }
    }

    fn receive_bytes(&mut self, buf: &[u8]) -> Result<Vec<ReceivedPacket>, DriverError> {
        self.rx_line_buf.extend_from_slice(buf);
        let mut packets = Vec::new();
        while let Some(pos) = self.rx_line_buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.rx_line_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim();
            if let Some(hex_payload) = line.strip_prefix("radio_rx  ") {
                match hex::decode(hex_payload) {
                    Ok(bytes) => packets.push(ReceivedPacket { bytes, rssi: None }),
                    Err(_) => return Err(DriverError::Confused(format!("bad hex from module: {line}"))),
                }
            }
        }
        Ok(packets)
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DriverError> {
        self.tx_buf.extend_from_slice(b"mac pause\r\n");
        self.tx_buf.extend_from_slice(format!("radio tx {}\r\n", hex::encode(packet)).as_bytes());
        self.awaiting_rx_window_reopen = true;
        Ok(())
    }

    fn drain_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx_buf)
    }

    fn ready_to_send(&self) -> bool {
        true
    }

    fn kind(&self) -> DriverKind {
        DriverKind::LoRa
    }
}
