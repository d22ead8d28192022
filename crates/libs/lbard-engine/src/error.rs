//! Engine error taxonomy. Every variant is handled inside
//! [`crate::engine::Engine::tick`] itself — mapped to ignore/log/reset —
//! except the explicit `rebootwhenstuck` escalation path, which is the one
//! case allowed to propagate out of the main loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient radio I/O error: {0}")]
    Transient(String),

    #[error("radio driver confused: {0}")]
    DriverConfused(String),

    #[error("FEC failure: {0}")]
    FecFailure(#[from] lbard_radio::FecError),

    #[error("HTTP request failed: {0}")]
    HttpFailure(String),

    #[error("malformed packet field: {0}")]
    MalformedPacket(#[from] lbard_proto::ProtoError),

    #[error("sync-tree corrupted: {0}")]
    SyncTreeCorrupt(#[from] lbard_sync::SyncTreeError),

    #[error("peer generation id mismatch, peer record recreated")]
    GenerationMismatch,

    #[error("radio driver stuck after repeated resets; rebootwhenstuck is set")]
    StuckRebootRequested,
}
