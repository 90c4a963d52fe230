//! Time entries and the persisted timer/clock state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TeamId, TicketId, TimeEntryId, UserId};

/// Where a time entry was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Local,
    Server,
}

/// A span of tracked time; `end` is absent while the timer runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: TimeEntryId,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub ticket_id: TicketId,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub source: EntrySource,
    #[serde(default)]
    pub pending_sync: bool,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Start a new running local entry
    #[must_use]
    pub fn start(
        user_id: UserId,
        team_id: TeamId,
        ticket_id: TicketId,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TimeEntryId::new(),
            user_id,
            team_id,
            ticket_id,
            start,
            end: None,
            duration_ms: None,
            note: None,
            source: EntrySource::Local,
            pending_sync: true,
            created_at: start,
        }
    }

    /// Whether this entry is still running
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.end.is_none()
    }

    /// Close the entry at `end`, computing its duration
    pub fn finish(&mut self, end: DateTime<Utc>, note: Option<String>) {
        self.duration_ms = Some(elapsed_ms(self.start, end));
        self.end = Some(end);
        self.note = note;
        self.pending_sync = true;
    }
}

/// The single running timer, persisted for warm restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimer {
    pub team_id: TeamId,
    pub ticket_id: TicketId,
    pub time_entry_id: TimeEntryId,
    pub started_at: DateTime<Utc>,
}

impl ActiveTimer {
    /// Elapsed milliseconds at `now`
    #[must_use]
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        elapsed_ms(self.started_at, now)
    }
}

/// Clock-in state, persisted for warm restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub is_clocked_in: bool,
    pub clocked_in_at: Option<DateTime<Utc>>,
    pub clocked_in_team_id: Option<TeamId>,
}

/// Milliseconds from `start` to `end`, clamped at zero
#[must_use]
pub fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(0)
}
