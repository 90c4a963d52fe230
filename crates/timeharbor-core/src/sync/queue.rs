//! Persisted FIFO of mutations awaiting the server

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Notify;

use super::network::NetworkMonitor;
use super::push;
use super::status::StatusHub;
use crate::config::SyncSettings;
use crate::db::{Batch, Index, Store};
use crate::models::{
    ActiveTimer, Assignment, EntityKind, QueueItemId, SyncMutation, SyncQueueItem, TimeEntry,
};
use crate::remote::RemoteDataService;
use crate::{db::metadata, Error, Result};

/// Items pushed and dropped by one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub pushed: usize,
    pub dropped: usize,
}

/// Handle to the durable sync queue; clones share the same queue
#[derive(Clone)]
pub struct SyncQueue {
    store: Store,
    status: StatusHub,
    settings: SyncSettings,
    enqueued: Arc<Notify>,
}

impl SyncQueue {
    pub fn new(store: Store, status: StatusHub, settings: SyncSettings) -> Self {
        Self {
            store,
            status,
            settings,
            enqueued: Arc::new(Notify::new()),
        }
    }

    pub(crate) const fn store(&self) -> &Store {
        &self.store
    }

    /// Fires after every enqueue
    pub(crate) fn enqueued(&self) -> Arc<Notify> {
        Arc::clone(&self.enqueued)
    }

    /// Persist `mutation` for a later push.
    ///
    /// Never touches the network.
    pub async fn enqueue(&self, mutation: SyncMutation) -> Result<SyncQueueItem> {
        let mut batch = self.store.batch();
        let item = Self::stage(&mut batch, mutation)?;
        batch.commit().await?;
        self.committed(&item).await;
        Ok(item)
    }

    /// Add `mutation` to `batch`, so it lands in the same transaction as the
    /// local write it mirrors. Call [`Self::committed`] after the commit.
    pub(crate) fn stage(batch: &mut Batch<'_>, mutation: SyncMutation) -> Result<SyncQueueItem> {
        let item = SyncQueueItem::new(mutation);
        batch.put(&item)?;
        Ok(item)
    }

    /// Publish a committed item: refresh the pending count and wake the engine
    pub(crate) async fn committed(&self, item: &SyncQueueItem) {
        tracing::debug!(
            "Queued {} {} {}",
            item.mutation.operation(),
            item.mutation.entity(),
            item.mutation.entity_id()
        );

        // the item is already durable, a stale count is corrected next refresh
        if let Err(error) = self.refresh_pending().await {
            tracing::warn!("Failed to refresh pending count: {error}");
        }
        self.enqueued.notify_one();
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.sync_queue().count().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Queued items in insertion order
    pub async fn items(&self) -> Result<Vec<SyncQueueItem>> {
        self.store.sync_queue().get_all().await
    }

    async fn front(&self) -> Result<Option<SyncQueueItem>> {
        Ok(self.items().await?.into_iter().next())
    }

    /// Whether any queued item targets `entity` with the given id
    pub async fn has_pending(&self, entity: EntityKind, id: &str) -> Result<bool> {
        Ok(self
            .items()
            .await?
            .iter()
            .any(|item| item.mutation.targets(entity, id)))
    }

    /// Like [`Self::has_pending`], ignoring the item currently being pushed
    pub(crate) async fn has_other_pending(
        &self,
        entity: EntityKind,
        id: &str,
        current: &QueueItemId,
    ) -> Result<bool> {
        Ok(self
            .items()
            .await?
            .iter()
            .any(|item| item.id != *current && item.mutation.targets(entity, id)))
    }

    /// Ids of every `entity` with a queued mutation
    pub async fn pending_ids(&self, entity: EntityKind) -> Result<HashSet<String>> {
        Ok(self
            .items()
            .await?
            .iter()
            .filter(|item| item.mutation.entity() == entity)
            .map(|item| item.mutation.entity_id().to_string())
            .collect())
    }

    /// Recompute the pending count from the store and publish it
    pub async fn refresh_pending(&self) -> Result<usize> {
        let queued = usize::try_from(self.len().await?).unwrap_or(usize::MAX);
        let notes: usize = self
            .store
            .tickets()
            .get_by_index(Index::PendingSync, true)
            .await?
            .iter()
            .map(crate::models::Ticket::pending_note_count)
            .sum();

        let pending = queued.saturating_add(notes);
        self.status.set_pending(pending);
        Ok(pending)
    }

    /// Push every queued item in order.
    ///
    /// A failing item is retried in place with exponential backoff, so later
    /// items wait behind it. Losing connectivity stops the drain with
    /// [`Error::Offline`] and leaves the current item queued.
    pub async fn drain<R: RemoteDataService>(
        &self,
        remote: &R,
        network: &NetworkMonitor,
    ) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        while let Some(mut item) = self.front().await? {
            loop {
                match push::push_item(self, remote, network, &item).await {
                    // the push removes the item together with its local writes
                    Ok(()) => {
                        report.pushed += 1;
                        break;
                    }
                    Err(Error::Remote(error)) if item.retry_count >= self.settings.max_retries => {
                        tracing::error!(
                            "Dropping {} {} {} after {} retries: {}",
                            item.mutation.operation(),
                            item.mutation.entity(),
                            item.mutation.entity_id(),
                            item.retry_count,
                            error
                        );
                        self.store.sync_queue().remove(item.id.as_str()).await?;
                        self.status
                            .record_permanent_failure(item.clone(), error.to_string());
                        report.dropped += 1;
                        break;
                    }
                    Err(Error::Remote(error)) => {
                        let delay = self.settings.backoff(item.retry_count);
                        item.retry_count += 1;
                        self.store.sync_queue().put(&item).await?;
                        tracing::warn!(
                            "Push of {} {} failed (attempt {}), retrying in {:?}: {}",
                            item.mutation.entity(),
                            item.mutation.entity_id(),
                            item.retry_count,
                            delay,
                            error
                        );
                        network.while_online(tokio::time::sleep(delay)).await?;
                    }
                    Err(error) => return Err(error),
                }
            }
            self.refresh_pending().await?;
        }

        Ok(report)
    }

    /// Stage the rewrite of every reference to a server-reassigned id.
    ///
    /// Covers later queue items, local rows pointing at a remapped ticket
    /// and the persisted active timer. `current` is the item being pushed.
    pub(crate) async fn stage_remap(
        &self,
        batch: &mut Batch<'_>,
        entity: EntityKind,
        old: &str,
        new: &str,
        current: &QueueItemId,
    ) -> Result<()> {
        for mut item in self.items().await? {
            if item.id != *current && item.mutation.remap_id(entity, old, new) {
                batch.put(&item)?;
            }
        }

        if entity == EntityKind::Ticket {
            let entries: Vec<TimeEntry> = self
                .store
                .time_entries()
                .get_by_index(Index::ByTicket, old)
                .await?;
            for mut entry in entries {
                entry.ticket_id = new.into();
                batch.put(&entry)?;
            }
            let assignments: Vec<Assignment> = self
                .store
                .assignments()
                .get_by_index(Index::ByTicket, old)
                .await?;
            for mut assignment in assignments {
                assignment.ticket_id = new.into();
                batch.put(&assignment)?;
            }
        }

        let timer: Option<ActiveTimer> = self.store.metadata().get(metadata::ACTIVE_TIMER).await?;
        if let Some(mut timer) = timer {
            let changed = match entity {
                EntityKind::Ticket if timer.ticket_id.as_str() == old => {
                    timer.ticket_id = new.into();
                    true
                }
                EntityKind::TimeEntry if timer.time_entry_id.as_str() == old => {
                    timer.time_entry_id = new.into();
                    true
                }
                _ => false,
            };
            if changed {
                batch.set_metadata(metadata::ACTIVE_TIMER, &timer)?;
            }
        }

        tracing::info!("Remapped {entity} {old} to server id {new}");
        Ok(())
    }
}
