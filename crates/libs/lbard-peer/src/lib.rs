//! Per-peer state: transmit queues, admission priority, the report queue
//! and the bounded peer table.

pub mod priority;
pub mod record;
pub mod report;
pub mod table;
pub mod tx_queue;

pub use priority::compute_priority;
pub use record::{PeerRecord, MAX_RSSI_LOG, SID_PREFIX_LEN};
pub use report::{ReportEntry, ReportQueue, MAX_REPORT_ENTRY_LEN, MAX_REPORT_QUEUE_LEN};
pub use table::{PeerTable, MAX_PEERS};
pub use tx_queue::{QueuedBundle, TxState, MANIFEST_FULLY_SENT_OFFSET};
