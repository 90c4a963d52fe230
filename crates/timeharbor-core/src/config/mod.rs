//! Sync engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Applications may also build [`SyncSettings`] in code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_RETRIES_LIMIT: u32 = 16;

/// Tunables for the sync queue and engine triggers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SyncSettings {
    /// Failed attempts an item may accumulate before it is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; each retry doubles it
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Periodic sync while online; `None` disables it
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: Option<u64>,
    /// Quiet period after an enqueue before a sync is triggered
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_retry_base_ms() -> u64 {
    1_000
}

#[allow(clippy::unnecessary_wraps)]
const fn default_sync_interval_secs() -> Option<u64> {
    Some(30)
}

const fn default_debounce_ms() -> u64 {
    1_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SyncSettings {
    /// Backoff before retrying an item that has already failed `retry_count` times
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 1_u64 << retry_count.min(MAX_RETRIES_LIMIT);
        Duration::from_millis(self.retry_base_ms.saturating_mul(factor))
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn validate(self) -> Result<Self> {
        if self.retry_base_ms == 0 {
            return Err(Error::InvalidInput(
                "retryBaseMs must be greater than zero".to_string(),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::InvalidInput(format!(
                "maxRetries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        Ok(self)
    }
}

/// Parse and validate sync settings from a JSON payload.
pub fn parse_sync_settings(payload: &str) -> Result<SyncSettings> {
    let settings: SyncSettings = serde_json::from_str(payload)
        .map_err(|error| Error::InvalidInput(format!("invalid sync settings JSON: {error}")))?;
    settings.validate()
}
