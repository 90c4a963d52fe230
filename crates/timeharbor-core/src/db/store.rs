//! Shared durable store handle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::{broadcast, Mutex, MutexGuard};

use super::batch::Batch;
use super::collection::{Collection, Record};
use super::metadata::Metadata;
use super::schema::CollectionName;
use super::Database;
use crate::models::{
    ActivityLogEntry, Assignment, Membership, SyncQueueItem, Team, Ticket, TimeEntry, User,
};
use crate::{Error, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub(super) struct StoreInner {
    db: Database,
    ensured: HashSet<CollectionName>,
}

impl StoreInner {
    pub(super) const fn connection(&self) -> &Connection {
        self.db.connection()
    }
}

/// Process-wide durable store.
///
/// Cloning is cheap; all clones share one connection, so a resolved write is
/// visible to every later read through any clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
    changes: broadcast::Sender<CollectionName>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open a store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh store is
    /// created in its place.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is unreadable: {}. Quarantining and recreating.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, None))
    }

    fn from_database(db: Database, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                db,
                ensured: HashSet::new(),
            })),
            changes,
            path,
        }
    }

    /// Filesystem path of the store, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Subscribe to collection change notifications
    pub fn changes(&self) -> broadcast::Receiver<CollectionName> {
        self.changes.subscribe()
    }

    pub(super) fn notify(&self, collection: CollectionName) {
        // No subscribers is fine
        let _ = self.changes.send(collection);
    }

    /// Lock the connection, creating any of `collections` this process has
    /// not touched yet.
    pub(super) async fn lock_collections(
        &self,
        collections: &[CollectionName],
    ) -> Result<MutexGuard<'_, StoreInner>> {
        let mut inner = self.inner.lock().await;
        for &collection in collections {
            if inner.ensured.contains(&collection) {
                continue;
            }
            for stmt in collection.create_statements() {
                inner.connection().execute(&stmt, ()).await?;
            }
            tracing::debug!("Collection {collection} ready");
            inner.ensured.insert(collection);
        }
        Ok(inner)
    }

    pub(super) async fn lock_collection(
        &self,
        collection: CollectionName,
    ) -> Result<MutexGuard<'_, StoreInner>> {
        self.lock_collections(&[collection]).await
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().await
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        self.lock().await.connection().execute(sql, ()).await?;
        Ok(())
    }

    /// Typed handle to the collection holding `R`
    pub const fn collection<R: Record>(&self) -> Collection<'_, R> {
        Collection::new(self)
    }

    pub const fn users(&self) -> Collection<'_, User> {
        self.collection()
    }

    pub const fn teams(&self) -> Collection<'_, Team> {
        self.collection()
    }

    pub const fn memberships(&self) -> Collection<'_, Membership> {
        self.collection()
    }

    pub const fn tickets(&self) -> Collection<'_, Ticket> {
        self.collection()
    }

    pub const fn time_entries(&self) -> Collection<'_, TimeEntry> {
        self.collection()
    }

    pub const fn assignments(&self) -> Collection<'_, Assignment> {
        self.collection()
    }

    pub const fn activity_log(&self) -> Collection<'_, ActivityLogEntry> {
        self.collection()
    }

    pub const fn sync_queue(&self) -> Collection<'_, SyncQueueItem> {
        self.collection()
    }

    /// Engine bookkeeping key/value store
    pub const fn metadata(&self) -> Metadata<'_> {
        Metadata::new(self)
    }

    /// Start a multi-collection write that commits atomically
    pub fn batch(&self) -> Batch<'_> {
        Batch::new(self)
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .map_or_else(|| "harbor.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local store from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale store sidecar {}", path.display());
            }
        }

        Ok(())
    }
}
