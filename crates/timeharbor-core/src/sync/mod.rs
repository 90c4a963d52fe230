//! Offline sync: the durable mutation queue, connectivity tracking, status
//! reporting and the push/pull engine.

mod engine;
pub mod merge;
mod network;
mod push;
mod queue;
mod status;

pub use engine::{SyncEngine, SyncOutcome};
pub use network::NetworkMonitor;
pub use queue::{DrainReport, SyncQueue};
pub use status::{StatusHub, SyncEvent, SyncReport, SyncSnapshot};
