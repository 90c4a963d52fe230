//! Pushes one queued mutation to the remote service.
//!
//! Each handler makes a single guarded remote call, then commits its local
//! follow-up writes and the removal of the queue item in one batch. Fields
//! the user changed after the item was queued are never overwritten: a later
//! queued item for the same entity keeps it flagged as pending.

use std::collections::HashSet;

use super::merge::merge_notes;
use super::network::NetworkMonitor;
use super::queue::SyncQueue;
use crate::models::{
    Assignment, Change, EntityKind, SyncMutation, SyncQueueItem, Ticket, TimeEntry,
};
use crate::remote::{
    AssignmentPatch, NewAssignment, NewTicket, NewTimeEntry, RemoteDataService, RemoteError,
    RemoteResult, TicketPatch, TimeEntryPatch,
};
use crate::Result;

pub(super) async fn push_item<R: RemoteDataService>(
    queue: &SyncQueue,
    remote: &R,
    network: &NetworkMonitor,
    item: &SyncQueueItem,
) -> Result<()> {
    match &item.mutation {
        SyncMutation::Ticket(Change::Create(ticket)) => {
            let created = network
                .while_online(remote.create_ticket(&ticket.team_id, NewTicket::from(ticket)))
                .await??;
            ticket_created(queue, item, ticket, created).await
        }
        SyncMutation::Ticket(Change::Update(ticket)) => {
            network
                .while_online(remote.update_ticket(&ticket.id, TicketPatch::from(ticket)))
                .await??;
            ticket_updated(queue, item, ticket).await
        }
        SyncMutation::Ticket(Change::Delete(ticket)) => {
            idempotent_delete(network.while_online(remote.delete_ticket(&ticket.id)).await?)?;
            let mut batch = queue.store().batch();
            batch
                .remove::<Ticket>(ticket.id.as_str())
                .remove::<SyncQueueItem>(item.id.as_str());
            batch.commit().await
        }
        SyncMutation::TimeEntry(Change::Create(entry)) => {
            let created = network
                .while_online(remote.create_time_entry(NewTimeEntry::from(entry)))
                .await??;
            time_entry_created(queue, item, entry, &created).await
        }
        SyncMutation::TimeEntry(Change::Update(entry)) => {
            network
                .while_online(remote.update_time_entry(&entry.id, TimeEntryPatch::from(entry)))
                .await??;
            time_entry_updated(queue, item, entry).await
        }
        SyncMutation::TimeEntry(Change::Delete(entry)) => {
            idempotent_delete(network.while_online(remote.delete_time_entry(&entry.id)).await?)?;
            let mut batch = queue.store().batch();
            batch
                .remove::<TimeEntry>(entry.id.as_str())
                .remove::<SyncQueueItem>(item.id.as_str());
            batch.commit().await
        }
        SyncMutation::Assignment(Change::Create(assignment)) => {
            let created = network
                .while_online(remote.create_assignment(NewAssignment::from(assignment)))
                .await??;
            assignment_confirmed(queue, item, assignment, created).await
        }
        SyncMutation::Assignment(Change::Update(assignment)) => {
            let patch = AssignmentPatch {
                assignee_user_id: assignment.assignee_user_id.clone(),
            };
            let updated = network
                .while_online(remote.update_assignment(&assignment.id, patch))
                .await??;
            assignment_confirmed(queue, item, assignment, updated).await
        }
        SyncMutation::Assignment(Change::Delete(assignment)) => {
            idempotent_delete(
                network
                    .while_online(remote.delete_assignment(&assignment.id))
                    .await?,
            )?;
            let mut batch = queue.store().batch();
            batch
                .remove::<Assignment>(assignment.id.as_str())
                .remove::<SyncQueueItem>(item.id.as_str());
            batch.commit().await
        }
    }
}

/// Deleting something the server no longer has counts as success
fn idempotent_delete(result: RemoteResult<()>) -> Result<()> {
    match result {
        Ok(()) | Err(RemoteError::NotFound(_)) => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Mark the notes the server has now seen as flushed
fn flush_notes(ticket: &mut Ticket, sent: &Ticket) {
    let sent_ids: HashSet<&str> = sent.notes.iter().map(|note| note.id.as_str()).collect();
    for note in &mut ticket.notes {
        if sent_ids.contains(note.id.as_str()) {
            note.pending_sync = false;
        }
    }
}

async fn ticket_created(
    queue: &SyncQueue,
    item: &SyncQueueItem,
    sent: &Ticket,
    created: Ticket,
) -> Result<()> {
    let store = queue.store();
    let mut batch = store.batch();
    let old_id = sent.id.as_str();
    let new_id = created.id.to_string();

    if new_id != old_id {
        queue
            .stage_remap(&mut batch, EntityKind::Ticket, old_id, &new_id, &item.id)
            .await?;
        batch.remove::<Ticket>(old_id);
    }

    // deleted locally after enqueue: a later delete is queued for it
    if let Some(local) = store.tickets().get(old_id).await? {
        let later = queue
            .has_other_pending(EntityKind::Ticket, old_id, &item.id)
            .await?;
        let mut ticket = if later {
            Ticket {
                id: created.id.clone(),
                ..local
            }
        } else {
            Ticket {
                notes: merge_notes(&created.notes, &local.notes),
                ..created
            }
        };
        flush_notes(&mut ticket, sent);
        ticket.pending_sync = later || ticket.pending_note_count() > 0;
        batch.put(&ticket)?;
    }

    batch.remove::<SyncQueueItem>(item.id.as_str());
    batch.commit().await
}

async fn ticket_updated(queue: &SyncQueue, item: &SyncQueueItem, sent: &Ticket) -> Result<()> {
    let store = queue.store();
    let mut batch = store.batch();

    if let Some(mut ticket) = store.tickets().get(sent.id.as_str()).await? {
        let later = queue
            .has_other_pending(EntityKind::Ticket, sent.id.as_str(), &item.id)
            .await?;
        flush_notes(&mut ticket, sent);
        ticket.pending_sync = later || ticket.pending_note_count() > 0;
        batch.put(&ticket)?;
    }

    batch.remove::<SyncQueueItem>(item.id.as_str());
    batch.commit().await
}

async fn time_entry_created(
    queue: &SyncQueue,
    item: &SyncQueueItem,
    sent: &TimeEntry,
    created: &TimeEntry,
) -> Result<()> {
    let store = queue.store();
    let mut batch = store.batch();
    let old_id = sent.id.as_str();
    let new_id = created.id.to_string();

    if new_id != old_id {
        queue
            .stage_remap(&mut batch, EntityKind::TimeEntry, old_id, &new_id, &item.id)
            .await?;
        batch.remove::<TimeEntry>(old_id);
    }

    if let Some(mut entry) = store.time_entries().get(old_id).await? {
        let later = queue
            .has_other_pending(EntityKind::TimeEntry, old_id, &item.id)
            .await?;
        entry.id = created.id.clone();
        if !later {
            entry.pending_sync = false;
        }
        batch.put(&entry)?;
    }

    batch.remove::<SyncQueueItem>(item.id.as_str());
    batch.commit().await
}

async fn time_entry_updated(queue: &SyncQueue, item: &SyncQueueItem, sent: &TimeEntry) -> Result<()> {
    let store = queue.store();
    let mut batch = store.batch();

    let later = queue
        .has_other_pending(EntityKind::TimeEntry, sent.id.as_str(), &item.id)
        .await?;
    if !later {
        if let Some(mut entry) = store.time_entries().get(sent.id.as_str()).await? {
            entry.pending_sync = false;
            batch.put(&entry)?;
        }
    }

    batch.remove::<SyncQueueItem>(item.id.as_str());
    batch.commit().await
}

async fn assignment_confirmed(
    queue: &SyncQueue,
    item: &SyncQueueItem,
    sent: &Assignment,
    confirmed: Assignment,
) -> Result<()> {
    let store = queue.store();
    let mut batch = store.batch();
    let old_id = sent.id.as_str();
    let new_id = confirmed.id.to_string();

    if new_id != old_id {
        queue
            .stage_remap(&mut batch, EntityKind::Assignment, old_id, &new_id, &item.id)
            .await?;
        batch.remove::<Assignment>(old_id);
    }

    if let Some(local) = store.assignments().get(old_id).await? {
        let later = queue
            .has_other_pending(EntityKind::Assignment, old_id, &item.id)
            .await?;
        let assignment = if later {
            Assignment {
                id: confirmed.id,
                ..local
            }
        } else {
            confirmed
        };
        batch.put(&assignment)?;
    }

    batch.remove::<SyncQueueItem>(item.id.as_str());
    batch.commit().await
}
