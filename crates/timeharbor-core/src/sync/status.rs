//! Sync status and pending-change surface.
//!
//! Observers either watch the latest [`SyncSnapshot`] or subscribe to the
//! [`SyncEvent`] stream; neither needs to poll.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use crate::models::SyncQueueItem;
use crate::state::SyncStatus;

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Current observable sync state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub state: SyncStatus,
    /// Queued mutations plus notes not yet flushed
    pub pending: usize,
    /// Items dropped after exhausting their retries
    pub permanent_failures: usize,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncSnapshot {
    /// Whether there is unsynced local data
    pub const fn has_pending(&self) -> bool {
        self.pending > 0
    }
}

/// Summary of one completed sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub dropped: usize,
    pub activity_pushed: usize,
    /// Whether server state was pulled this cycle
    pub pulled: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StateChanged(SyncStatus),
    PendingChanged(usize),
    /// A queued mutation was dropped and will never reach the server
    PermanentFailure {
        item: Box<SyncQueueItem>,
        error: String,
    },
    CycleCompleted(SyncReport),
}

/// Shared publisher for sync state; clones publish to the same channels
#[derive(Clone)]
pub struct StatusHub {
    snapshot: Arc<watch::Sender<SyncSnapshot>>,
    events: broadcast::Sender<SyncEvent>,
}

impl StatusHub {
    pub fn new(state: SyncStatus) -> Self {
        let (snapshot, _) = watch::channel(SyncSnapshot {
            state,
            pending: 0,
            permanent_failures: 0,
            last_synced_at: None,
        });
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            snapshot: Arc::new(snapshot),
            events,
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SyncStatus {
        self.snapshot.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn set_state(&self, state: SyncStatus) {
        let changed = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.state == state {
                false
            } else {
                snapshot.state = state;
                true
            }
        });
        if changed {
            tracing::debug!("Sync state changed to {state}");
            self.emit(SyncEvent::StateChanged(state));
        }
    }

    pub fn set_pending(&self, pending: usize) {
        let changed = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.pending == pending {
                false
            } else {
                snapshot.pending = pending;
                true
            }
        });
        if changed {
            self.emit(SyncEvent::PendingChanged(pending));
        }
    }

    pub fn set_last_synced_at(&self, at: DateTime<Utc>) {
        self.snapshot.send_modify(|snapshot| snapshot.last_synced_at = Some(at));
    }

    pub fn record_permanent_failure(&self, item: SyncQueueItem, error: String) {
        self.snapshot
            .send_modify(|snapshot| snapshot.permanent_failures += 1);
        self.emit(SyncEvent::PermanentFailure {
            item: Box::new(item),
            error,
        });
    }

    pub fn cycle_completed(&self, report: SyncReport) {
        self.emit(SyncEvent::CycleCompleted(report));
    }
}
