//! Radio driver trait, per-transport framing, and the Reed-Solomon FEC
//! layered uniformly over any driver's decapsulated bytes.

pub mod driver;
pub mod fake;
pub mod gf256;
pub mod hf_ale;
pub mod lora;
pub mod reed_solomon;
pub mod satellite;
pub mod serial;
pub mod uhf;

pub use driver::{DriverError, DriverKind, RadioDriver, ReceivedPacket, AUTODETECT_ORDER};
pub use fake::{paired, FakeRadioDriver};
pub use hf_ale::{AleState, HfAleDriver, HfVendor};
pub use lora::LoRaDriver;
pub use reed_solomon::{decode as fec_decode, encode as fec_encode, Decoded as FecDecoded, FecError};
pub use satellite::SatelliteDriver;
pub use uhf::UhfDriver;
