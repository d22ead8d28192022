//! In-process fake driver: lets integration tests wire several engines
//! together without touching real serial ports or sockets, by handing
//! packets directly between driver instances that share an
//! [`std::sync::mpsc`] channel pair.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender};

use crate::driver::{DriverError, DriverKind, RadioDriver, ReceivedPacket};

pub struct FakeLink {
    pub tx: Sender<Vec<u8>>,
    pub rx: Receiver<Vec<u8>>,
}

/// Builds a pair of fake drivers wired directly to each other, as if two
/// nodes shared a lossless point-to-point channel.
pub fn paired() -> (FakeRadioDriver, FakeRadioDriver) {
    let (tx_a, rx_b) = std::sync::mpsc::channel();
    let (tx_b, rx_a) = std::sync::mpsc::channel();
    (FakeRadioDriver::new(tx_a, rx_a), FakeRadioDriver::new(tx_b, rx_b))
}

pub struct FakeRadioDriver {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    inbox: VecDeque<ReceivedPacket>,
    /// Drops every Nth packet sent through this driver (0 disables loss).
    pub drop_every_nth: u32,
    sent_count: u32,
}

impl FakeRadioDriver {
    pub fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self { tx, rx, inbox: VecDeque::new(), drop_every_nth: 0, sent_count: 0 }
    }

    /// Pumps any packets the peer has sent since the last call into this
    /// driver's inbox, simulating a radio "tick" without real I/O.
    pub fn pump(&mut self) {
        while let Ok(packet) = self.rx.try_recv() {
            self.inbox.push_back(ReceivedPacket { bytes: packet, rssi: Some(-40) });
        }
    }
}

impl RadioDriver for FakeRadioDriver {
    fn service_tick(&mut self, _now_ms: u64) {
        self.pump();
    }

    fn receive_bytes(&mut self, _buf: &[u8]) -> Result<Vec<ReceivedPacket>, DriverError> {
        self.pump();
        Ok(self.inbox.drain(..).collect())
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DriverError> {
        self.sent_count += 1;
        if self.drop_every_nth != 0 && self.sent_count % self.drop_every_nth == 0 {
            return Ok(());
        }
        self.tx.send(packet.to_vec()).map_err(|e| DriverError::Io(e.to_string()))
    }

    fn drain_tx(&mut self) -> Vec<u8> {
        Vec::new()
    }

    fn ready_to_send(&self) -> bool {
        true
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Uhf
    }
}
