pub mod bundle;
pub mod config;
pub mod engine;
pub mod error;
pub mod timesync;

pub use bundle::{BundleRecord, BundleTable};
pub use config::{Config, ConfigError, HfConfig};
pub use engine::{Engine, EngineOptions, MTU};
pub use error::EngineError;
pub use timesync::{TimeRole, TimeSync};
