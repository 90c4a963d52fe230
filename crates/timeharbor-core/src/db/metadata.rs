//! Engine bookkeeping key/value store

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Store;
use crate::Result;

/// ISO-8601 time of the last completed pull
pub const LAST_SYNCED_AT: &str = "lastSyncedAt";
/// The running timer, if any
pub const ACTIVE_TIMER: &str = "activeTimer";
/// Clock-in state
pub const CLOCKED_IN_STATE: &str = "clockedInState";
/// Signed-in user and current team
pub const SESSION: &str = "session";

/// JSON values keyed by name
pub struct Metadata<'a> {
    store: &'a Store,
}

impl<'a> Metadata<'a> {
    pub(super) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let inner = self.store.lock().await;
        let mut rows = inner
            .connection()
            .query("SELECT value FROM metadata WHERE key = ?1", [key])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let value: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_string(value)?;
        let inner = self.store.lock().await;
        inner
            .connection()
            .execute(
                "INSERT INTO metadata (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value.as_str()],
            )
            .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let inner = self.store.lock().await;
        inner
            .connection()
            .execute("DELETE FROM metadata WHERE key = ?1", [key])
            .await?;
        Ok(())
    }
}
