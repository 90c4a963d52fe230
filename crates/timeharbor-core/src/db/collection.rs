//! Typed collections over the durable store

use std::marker::PhantomData;

use libsql::params::Params;
use libsql::{Rows, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::batch::upsert;
use super::schema::{CollectionName, Index, IndexValue};
use super::Store;
use crate::models::{
    ActivityLogEntry, Assignment, Membership, SyncQueueItem, Team, Ticket, TimeEntry, User,
};
use crate::{Error, Result};

/// A record persisted in one typed collection
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the record lives in
    const COLLECTION: CollectionName;

    /// Primary key
    fn key(&self) -> String;
}

impl Record for User {
    const COLLECTION: CollectionName = CollectionName::Users;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Team {
    const COLLECTION: CollectionName = CollectionName::Teams;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Membership {
    const COLLECTION: CollectionName = CollectionName::Memberships;

    fn key(&self) -> String {
        Self::key_for(&self.user_id, &self.team_id)
    }
}

impl Record for Ticket {
    const COLLECTION: CollectionName = CollectionName::Tickets;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for TimeEntry {
    const COLLECTION: CollectionName = CollectionName::TimeEntries;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Assignment {
    const COLLECTION: CollectionName = CollectionName::Assignments;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for ActivityLogEntry {
    const COLLECTION: CollectionName = CollectionName::ActivityLog;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for SyncQueueItem {
    const COLLECTION: CollectionName = CollectionName::SyncQueue;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Handle to the collection holding `R`
pub struct Collection<'a, R> {
    store: &'a Store,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R: Record> Collection<'a, R> {
    pub(super) const fn new(store: &'a Store) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    fn table() -> &'static str {
        R::COLLECTION.table()
    }

    fn check_index(index: Index) -> Result<()> {
        if R::COLLECTION.has_index(index) {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "collection {} has no index {}",
                R::COLLECTION,
                index.name()
            )))
        }
    }

    /// Upsert a record; writing the same record twice is a no-op
    pub async fn put(&self, record: &R) -> Result<()> {
        let body = serde_json::to_string(record)?;
        {
            let inner = self.store.lock_collection(R::COLLECTION).await?;
            upsert(inner.connection(), R::COLLECTION, record.key(), body).await?;
        }
        self.store.notify(R::COLLECTION);
        Ok(())
    }

    /// Upsert all records in one transaction
    pub async fn put_many(&self, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut batch = self.store.batch();
        for record in records {
            batch.put(record)?;
        }
        batch.commit().await
    }

    pub async fn get(&self, key: &str) -> Result<Option<R>> {
        let inner = self.store.lock_collection(R::COLLECTION).await?;
        let mut rows = inner
            .connection()
            .query(
                &format!("SELECT body FROM {} WHERE key = ?1", Self::table()),
                [key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// All records in insertion order
    pub async fn get_all(&self) -> Result<Vec<R>> {
        let inner = self.store.lock_collection(R::COLLECTION).await?;
        let rows = inner
            .connection()
            .query(
                &format!("SELECT body FROM {} ORDER BY rowid", Self::table()),
                (),
            )
            .await?;
        decode_all(rows).await
    }

    /// Records whose indexed field equals `value`, in insertion order
    pub async fn get_by_index(&self, index: Index, value: impl Into<IndexValue>) -> Result<Vec<R>> {
        Self::check_index(index)?;
        let inner = self.store.lock_collection(R::COLLECTION).await?;
        let rows = inner
            .connection()
            .query(
                &format!(
                    "SELECT body FROM {} WHERE {} = ?1 ORDER BY rowid",
                    Self::table(),
                    index.expression()
                ),
                Params::Positional(vec![Value::from(value.into())]),
            )
            .await?;
        decode_all(rows).await
    }

    /// Remove a record; removing a missing key is not an error
    pub async fn remove(&self, key: &str) -> Result<()> {
        {
            let inner = self.store.lock_collection(R::COLLECTION).await?;
            inner
                .connection()
                .execute(
                    &format!("DELETE FROM {} WHERE key = ?1", Self::table()),
                    [key],
                )
                .await?;
        }
        self.store.notify(R::COLLECTION);
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        {
            let inner = self.store.lock_collection(R::COLLECTION).await?;
            inner
                .connection()
                .execute(&format!("DELETE FROM {}", Self::table()), ())
                .await?;
        }
        self.store.notify(R::COLLECTION);
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        let inner = self.store.lock_collection(R::COLLECTION).await?;
        let mut rows = inner
            .connection()
            .query(&format!("SELECT COUNT(*) FROM {}", Self::table()), ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Atomically replace every record matching `index = value` with `records`
    pub async fn replace_by_index(
        &self,
        index: Index,
        value: impl Into<IndexValue>,
        records: &[R],
    ) -> Result<()> {
        Self::check_index(index)?;
        let mut batch = self.store.batch();
        batch.clear(R::COLLECTION, Some((index, value.into())));
        for record in records {
            batch.put(record)?;
        }
        batch.commit().await
    }

    /// Atomically replace the whole collection with `records`
    pub async fn replace_all(&self, records: &[R]) -> Result<()> {
        let mut batch = self.store.batch();
        batch.clear(R::COLLECTION, None);
        for record in records {
            batch.put(record)?;
        }
        batch.commit().await
    }
}

async fn decode_all<R: DeserializeOwned>(mut rows: Rows) -> Result<Vec<R>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        let body: String = row.get(0)?;
        records.push(serde_json::from_str(&body)?);
    }
    Ok(records)
}
