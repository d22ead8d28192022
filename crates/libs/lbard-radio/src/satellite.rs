//! Satellite UDP uplink driver:
//! one-way, so `receive_bytes`/`ready_to_send` are trivial, but outgoing
//! packets are spread across five size-binned lanes with independent
//! cursors so a handful of small urgent bundles never get stuck behind a
//! single large one.

use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};

use crate::driver::{DriverError, DriverKind, RadioDriver, ReceivedPacket};

const LANE_THRESHOLDS: [usize; 4] = [1024, 4096, 16384, 65536];
const NUM_LANES: usize = 5;

fn lane_for(len: usize) -> usize {
    LANE_THRESHOLDS.iter().position(|&t| len < t).unwrap_or(NUM_LANES - 1)
}

pub struct SatelliteDriver {
    socket: UdpSocket,
    destination: SocketAddr,
    lanes: [VecDeque<Vec<u8>>; NUM_LANES],
    next_lane_cursor: usize,
}

impl SatelliteDriver {
    pub fn bind(local: SocketAddr, destination: SocketAddr) -> Result<Self, DriverError> {
        let socket = UdpSocket::bind(local).map_err(|e| DriverError::Io(e.to_string()))?;
        socket.set_nonblocking(true).map_err(|e| DriverError::Io(e.to_string()))?;
        Ok(Self {
            socket,
            destination,
            lanes: Default::default(),
            next_lane_cursor: 0,
        })
    }

    /// Rotates through non-empty lanes so each advances its own cursor
    /// independently rather than starving behind full lanes.
    fn pop_next_ready(&mut self) -> Option<Vec<u8>> {
        for step in 0..NUM_LANES {
            let idx = (self.next_lane_cursor + step) % NUM_LANES;
            if let Some(packet) = self.lanes[idx].pop_front() {
                self.next_lane_cursor = (idx + 1) % NUM_LANES;
                return Some(packet);
            }
        }
        None
    }
}

impl RadioDriver for SatelliteDriver {
    fn service_tick(&mut self, _now_ms: u64) {
        while let Some(packet) = self.pop_next_ready() {
            if self.socket.send_to(&packet, self.destination).is_err() {
                break;
            }
        }
    }

    fn receive_bytes(&mut self, _buf: &[u8]) -> Result<Vec<ReceivedPacket>, DriverError> {
        // One-way uplink: nothing is ever received over this transport.
        Ok(Vec::new())
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DriverError> {
        self.lanes[lane_for(packet.len())].push_back(packet.to_vec());
        Ok(())
    }

    fn drain_tx(&mut self) -> Vec<u8> {
        Vec::new()
    }

    fn ready_to_send(&self) -> bool {
        true
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Satellite
    }
}
