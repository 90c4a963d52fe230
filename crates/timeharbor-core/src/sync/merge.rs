//! Reconciliation of pulled server state with local-only changes.
//!
//! Every function here is pure: it takes the server copy, the local copy and
//! the set of ids with queued mutations, and returns what should be stored.
//!
//! Concurrent edits to the same note on two devices are not resolved; the
//! per-id union in [`merge_notes`] is the only rule applied to notes.

use std::collections::{HashMap, HashSet};

use crate::models::{ActivityLogEntry, Assignment, Ticket, TicketNote, TimeEntry};

/// Union notes by id: server order first, then local-only notes.
///
/// A local note still pending wins over the server copy with the same id.
pub fn merge_notes(server: &[TicketNote], local: &[TicketNote]) -> Vec<TicketNote> {
    let local_by_id: HashMap<&str, &TicketNote> =
        local.iter().map(|note| (note.id.as_str(), note)).collect();
    let server_ids: HashSet<&str> = server.iter().map(|note| note.id.as_str()).collect();

    let mut merged: Vec<TicketNote> = server
        .iter()
        .map(|note| match local_by_id.get(note.id.as_str()) {
            Some(local) if local.pending_sync => (*local).clone(),
            _ => TicketNote {
                pending_sync: false,
                ..note.clone()
            },
        })
        .collect();

    merged.extend(
        local
            .iter()
            .filter(|note| !server_ids.contains(note.id.as_str()))
            .cloned(),
    );
    merged
}

/// Merge one team's pulled tickets with the local copies.
///
/// The result replaces the team's local tickets, so a local ticket missing
/// from `server` survives only while it is pending or queued.
pub fn merge_tickets(server: Vec<Ticket>, local: Vec<Ticket>, queued: &HashSet<String>) -> Vec<Ticket> {
    let server_ids: HashSet<String> = server.iter().map(|ticket| ticket.id.to_string()).collect();
    let mut local_by_id: HashMap<String, Ticket> = HashMap::new();
    let mut local_only = Vec::new();
    for ticket in local {
        if server_ids.contains(ticket.id.as_str()) {
            local_by_id.insert(ticket.id.to_string(), ticket);
        } else if ticket.pending_sync || queued.contains(ticket.id.as_str()) {
            local_only.push(ticket);
        } else {
            tracing::debug!("Ticket {} was removed on the server", ticket.id);
        }
    }

    let mut merged: Vec<Ticket> = server
        .into_iter()
        .map(|server_ticket| {
            let is_queued = queued.contains(server_ticket.id.as_str());
            match local_by_id.remove(server_ticket.id.as_str()) {
                Some(local) => merge_ticket(server_ticket, local, is_queued),
                None => Ticket {
                    notes: merge_notes(&server_ticket.notes, &[]),
                    pending_sync: false,
                    ..server_ticket
                },
            }
        })
        .collect();

    merged.extend(local_only);
    merged
}

fn merge_ticket(server: Ticket, local: Ticket, is_queued: bool) -> Ticket {
    let notes = merge_notes(&server.notes, &local.notes);
    let mut merged = Ticket { notes, ..server };

    if is_queued {
        // local edits still on their way win for the content they own
        merged.title = local.title;
        merged.description = local.description;
    }
    merged.pending_sync = is_queued || merged.pending_note_count() > 0;
    merged
}

/// Time entries to upsert after an incremental pull.
///
/// Local entries still pending are left as they are; any server copy of them
/// is ignored.
pub fn merge_time_entries(server: Vec<TimeEntry>, local: &[TimeEntry]) -> Vec<TimeEntry> {
    let pending: HashSet<&str> = local
        .iter()
        .filter(|entry| entry.pending_sync)
        .map(|entry| entry.id.as_str())
        .collect();

    server
        .into_iter()
        .filter(|entry| !pending.contains(entry.id.as_str()))
        .map(|entry| TimeEntry {
            pending_sync: false,
            ..entry
        })
        .collect()
}

/// Merge one team's pulled assignments; queued local copies win.
pub fn merge_assignments(
    server: Vec<Assignment>,
    local: &[Assignment],
    queued: &HashSet<String>,
) -> Vec<Assignment> {
    let kept: Vec<&Assignment> = local
        .iter()
        .filter(|assignment| queued.contains(assignment.id.as_str()))
        .collect();
    let kept_ids: HashSet<&str> = kept.iter().map(|assignment| assignment.id.as_str()).collect();

    let mut merged: Vec<Assignment> = server
        .into_iter()
        .filter(|assignment| !kept_ids.contains(assignment.id.as_str()))
        .collect();
    merged.extend(kept.into_iter().cloned());
    merged
}

/// Activity entries to upsert after an incremental pull.
pub fn merge_activity(server: Vec<ActivityLogEntry>, local: &[ActivityLogEntry]) -> Vec<ActivityLogEntry> {
    let pending: HashSet<&str> = local
        .iter()
        .filter(|entry| entry.pending_sync)
        .map(|entry| entry.id.as_str())
        .collect();

    server
        .into_iter()
        .filter(|entry| !pending.contains(entry.id.as_str()))
        .map(|entry| ActivityLogEntry {
            pending_sync: false,
            ..entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, TicketStatus};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn synced(mut ticket: Ticket) -> Ticket {
        ticket.pending_sync = false;
        ticket
    }

    fn note(content: &str, pending: bool) -> TicketNote {
        TicketNote {
            pending_sync: pending,
            ..TicketNote::new(content, "user-1".into())
        }
    }

    #[test]
    fn test_local_notes_survive_empty_server_copy() {
        let mut local = Ticket::new("team-1".into(), "API Documentation", "user-1".into());
        local.notes = vec![note("first", true), note("second", true)];
        let server = synced(Ticket {
            notes: Vec::new(),
            ..local.clone()
        });

        let merged = merge_tickets(vec![server], vec![local.clone()], &HashSet::new());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].notes, local.notes);
        assert!(merged[0].pending_sync);
    }

    #[test]
    fn test_note_union_orders_server_first() {
        let shared = note("shared", false);
        let server_only = note("server", false);
        let local_only = note("local", true);

        let merged = merge_notes(
            &[server_only.clone(), shared.clone()],
            &[shared.clone(), local_only.clone()],
        );

        assert_eq!(merged, vec![server_only, shared, local_only]);
    }

    #[test]
    fn test_pending_local_note_wins_same_id() {
        let local = note("edited locally", true);
        let server = TicketNote {
            content: "server copy".to_string(),
            pending_sync: false,
            ..local.clone()
        };

        let merged = merge_notes(&[server], std::slice::from_ref(&local));
        assert_eq!(merged, vec![local]);
    }

    #[test]
    fn test_server_scalars_win_for_unqueued_ticket() {
        let local = synced(Ticket::new("team-1".into(), "Old title", "user-1".into()));
        let server = Ticket {
            title: "New title".to_string(),
            status: TicketStatus::Completed,
            ..local.clone()
        };

        let merged = merge_tickets(vec![server], vec![local], &HashSet::new());
        assert_eq!(merged[0].title, "New title");
        assert_eq!(merged[0].status, TicketStatus::Completed);
        assert!(!merged[0].pending_sync);
    }

    #[test]
    fn test_queued_ticket_keeps_content_takes_status() {
        let local = Ticket::new("team-1".into(), "Local title", "user-1".into());
        let server = synced(Ticket {
            title: "Server title".to_string(),
            status: TicketStatus::Archived,
            ..local.clone()
        });
        let queued = HashSet::from([local.id.to_string()]);

        let merged = merge_tickets(vec![server], vec![local], &queued);
        assert_eq!(merged[0].title, "Local title");
        assert_eq!(merged[0].status, TicketStatus::Archived);
        assert!(merged[0].pending_sync);
    }

    #[test]
    fn test_stale_local_ticket_dropped_pending_kept() {
        let stale = synced(Ticket::new("team-1".into(), "Deleted upstream", "user-1".into()));
        let pending = Ticket::new("team-1".into(), "Created offline", "user-1".into());

        let merged = merge_tickets(Vec::new(), vec![stale, pending.clone()], &HashSet::new());
        assert_eq!(merged, vec![pending]);
    }

    #[test]
    fn test_pending_time_entries_not_overwritten() {
        let now = Utc::now();
        let mut pending = TimeEntry::start("user-1".into(), "team-1".into(), "ticket-1".into(), now);
        pending.finish(now, Some("local".to_string()));
        let server_copy = TimeEntry {
            note: Some("server".to_string()),
            pending_sync: false,
            ..pending.clone()
        };
        let server_new = TimeEntry {
            pending_sync: false,
            ..TimeEntry::start("user-1".into(), "team-1".into(), "ticket-2".into(), now)
        };

        let upserts = merge_time_entries(vec![server_copy, server_new.clone()], &[pending]);
        assert_eq!(upserts, vec![server_new]);
    }

    #[test]
    fn test_queued_assignment_kept() {
        let local = Assignment::new("team-1".into(), "ticket-1".into(), "user-2".into(), "user-1".into());
        let server_copy = Assignment {
            assignee_user_id: "user-3".into(),
            ..local.clone()
        };
        let other = Assignment::new("team-1".into(), "ticket-2".into(), "user-3".into(), "user-1".into());
        let queued = HashSet::from([local.id.to_string()]);

        let merged = merge_assignments(vec![server_copy, other.clone()], &[local.clone()], &queued);
        assert_eq!(merged, vec![other, local]);
    }

    #[test]
    fn test_pending_activity_not_overwritten() {
        let local = ActivityLogEntry::new(ActivityKind::ClockIn, Utc::now(), Some("user-1".into()));
        let server_copy = ActivityLogEntry {
            pending_sync: false,
            ..local.clone()
        };
        assert!(merge_activity(vec![server_copy], &[local]).is_empty());
    }
}
