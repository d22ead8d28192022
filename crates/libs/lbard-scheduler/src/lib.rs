//! Congestion control and outgoing-packet composition.

pub mod compose;
pub mod congestion;

pub use compose::{compose_packet_body, BundleSource};
pub use congestion::{CongestionController, DEFAULT_TARGET, WINDOW_MS};
