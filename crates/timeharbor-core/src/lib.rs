//! timeharbor-core - offline-first persistence and sync for Time Harbor
//!
//! Local writes land in a durable libSQL store and a persisted sync queue.
//! The sync engine pushes queued mutations to the remote data service when
//! connectivity allows, then pulls and reconciles server state.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod sync;
pub mod tracker;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SyncSettings;
pub use context::Harbor;
pub use error::{Error, Result, StorageError};
pub use remote::{RemoteDataService, RemoteError};
pub use state::SyncStatus;
pub use sync::{SyncEngine, SyncEvent, SyncOutcome, SyncSnapshot};
pub use tracker::TimeTracker;
