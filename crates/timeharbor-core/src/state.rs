//! Shared sync state type observed by clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync engine state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Offline,
    Idle,
    Syncing,
    Error,
}

impl SyncStatus {
    /// Initial state for the given connectivity
    pub const fn initial(online: bool) -> Self {
        if online {
            Self::Idle
        } else {
            Self::Offline
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
        })
    }
}
