pub mod client;
pub mod error;
pub mod mirror;
pub mod submit;

pub use client::RhizomeClient;
pub use error::StoreError;
pub use mirror::{BundleRow, StoreMirror, DEFAULT_POLL_INTERVAL_MS, JOURNAL_SERVICE};
pub use submit::SubmissionServer;
