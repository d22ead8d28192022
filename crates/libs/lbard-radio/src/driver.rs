//! Common radio driver contract. Every physical link — UHF,
//! HF/ALE, LoRa, or the satellite UDP uplink — implements this small
//! capability set; the engine dispatches through one concrete driver
//! chosen once at startup, never switching at runtime.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("serial/transport I/O error: {0}")]
    Io(String),
    #[error("driver confused by unexpected device response: {0}")]
    Confused(String),
    #[error("driver not ready to send")]
    NotReady,
}

/// A whole decapsulated packet handed back from a driver, with the signal
/// quality the link observed it at (if the link reports one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub bytes: Vec<u8>,
    pub rssi: Option<i8>,
}

/// Which concrete driver answered [`detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Uhf,
    HfAle,
    LoRa,
    Satellite,
}

/// State machine fed bytes (or ticks) one step at a time, never blocking.
pub trait RadioDriver {
    /// Internal timers: ALE link setup, turnaround waits, RX-window
    /// refresh. Called once per main-loop pass regardless of I/O activity.
    fn service_tick(&mut self, now_ms: u64);

    /// Pushes newly-read bytes into the driver's envelope decoder. Returns
    /// every whole packet the bytes completed, in arrival order.
    fn receive_bytes(&mut self, buf: &[u8]) -> Result<Vec<ReceivedPacket>, DriverError>;

    /// Frames and queues `packet` for transmission. Framing is driver
    /// specific: UHF's `!.`-escaped envelope, HF's hex-grouped ALE
    /// fragments, or LoRa's `mac pause` hex payload.
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DriverError>;

    /// Bytes the driver wants written to the transport right now (drained
    /// by the engine's non-blocking serial write), if any.
    fn drain_tx(&mut self) -> Vec<u8>;

    /// False while a TDMA-style shared link (HF) holds the token elsewhere.
    fn ready_to_send(&self) -> bool;

    fn kind(&self) -> DriverKind;
}

/// Autodetection order: UHF, then HF/ALE, then
/// LoRa. Satellite is never autodetected — only selected explicitly via
/// the `--radio=satellite` CLI flag, since there's no serial probe for a
/// UDP uplink.
pub const AUTODETECT_ORDER: [DriverKind; 3] = [DriverKind::Uhf, DriverKind::HfAle, DriverKind::LoRa];

/// Lets the CLI pick a driver at runtime (autodetect result or an explicit
/// `--radio` flag) and still hand the engine one concrete, monomorphic
/// type to run its main loop against.
impl RadioDriver for Box<dyn RadioDriver> {
    fn service_tick(&mut self, now_ms: u64) {
        (**self).service_tick(now_ms)
    }

    fn receive_bytes(&mut self, buf: &[u8]) -> Result<Vec<ReceivedPacket>, DriverError> {
        (**self).receive_bytes(buf)
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<(), DriverError> {
        (**self).send_packet(packet)
    }

    fn drain_tx(&mut self) -> Vec<u8> {
        (**self).drain_tx()
    }

    fn ready_to_send(&self) -> bool {
        (**self).ready_to_send()
    }

    fn kind(&self) -> DriverKind {
        (**self).kind()
    }
}
