//! Sync queue item model
//!
//! Each queued mutation is a typed variant carrying a snapshot of the entity
//! taken at enqueue time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Assignment, QueueItemId, Ticket, TimeEntry};

/// Kind of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Entity collection a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    TimeEntry,
    Ticket,
    Assignment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TimeEntry => "timeEntry",
            Self::Ticket => "ticket",
            Self::Assignment => "assignment",
        })
    }
}

/// A create, update or delete of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Change<T> {
    Create(T),
    Update(T),
    Delete(T),
}

impl<T> Change<T> {
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::Delete(_) => OperationKind::Delete,
        }
    }

    pub const fn payload(&self) -> &T {
        match self {
            Self::Create(value) | Self::Update(value) | Self::Delete(value) => value,
        }
    }

    pub fn payload_mut(&mut self) -> &mut T {
        match self {
            Self::Create(value) | Self::Update(value) | Self::Delete(value) => value,
        }
    }
}

/// A queued mutation, tagged by entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "change", rename_all = "camelCase")]
pub enum SyncMutation {
    TimeEntry(Change<TimeEntry>),
    Ticket(Change<Ticket>),
    Assignment(Change<Assignment>),
}

impl SyncMutation {
    pub const fn entity(&self) -> EntityKind {
        match self {
            Self::TimeEntry(_) => EntityKind::TimeEntry,
            Self::Ticket(_) => EntityKind::Ticket,
            Self::Assignment(_) => EntityKind::Assignment,
        }
    }

    pub const fn operation(&self) -> OperationKind {
        match self {
            Self::TimeEntry(change) => change.kind(),
            Self::Ticket(change) => change.kind(),
            Self::Assignment(change) => change.kind(),
        }
    }

    /// Id of the entity this mutation targets
    pub fn entity_id(&self) -> &str {
        match self {
            Self::TimeEntry(change) => change.payload().id.as_str(),
            Self::Ticket(change) => change.payload().id.as_str(),
            Self::Assignment(change) => change.payload().id.as_str(),
        }
    }

    /// Whether this mutation targets `entity` with the given id
    pub fn targets(&self, entity: EntityKind, id: &str) -> bool {
        self.entity() == entity && self.entity_id() == id
    }

    /// Rewrite every reference to an `entity` id the server replaced.
    ///
    /// Returns whether the payload changed.
    pub fn remap_id(&mut self, entity: EntityKind, old: &str, new: &str) -> bool {
        match (self, entity) {
            (Self::Ticket(change), EntityKind::Ticket) => {
                swap_id(&mut change.payload_mut().id, old, new)
            }
            (Self::TimeEntry(change), EntityKind::TimeEntry) => {
                swap_id(&mut change.payload_mut().id, old, new)
            }
            (Self::TimeEntry(change), EntityKind::Ticket) => {
                swap_id(&mut change.payload_mut().ticket_id, old, new)
            }
            (Self::Assignment(change), EntityKind::Assignment) => {
                swap_id(&mut change.payload_mut().id, old, new)
            }
            (Self::Assignment(change), EntityKind::Ticket) => {
                swap_id(&mut change.payload_mut().ticket_id, old, new)
            }
            _ => false,
        }
    }
}

fn swap_id<T>(id: &mut T, old: &str, new: &str) -> bool
where
    T: PartialEq + for<'a> From<&'a str>,
{
    if *id == T::from(old) {
        *id = T::from(new);
        true
    } else {
        false
    }
}

/// A persisted pending mutation with its retry state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: QueueItemId,
    pub mutation: SyncMutation,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncQueueItem {
    /// Create a fresh item with no retries
    #[must_use]
    pub fn new(mutation: SyncMutation) -> Self {
        Self {
            id: QueueItemId::new(),
            mutation,
            created_at: Utc::now(),
            retry_count: 0,
        }
    }
}
