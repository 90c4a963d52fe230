//! Activity log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityId, TicketId, UserId};

/// Kind of tracked activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    ClockIn,
    ClockOut,
    TimerStart,
    TimerStop,
    NoteAdded,
}

impl ActivityKind {
    /// Wire name, as stored in the `type` field
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClockIn => "clock-in",
            Self::ClockOut => "clock-out",
            Self::TimerStart => "timer-start",
            Self::TimerStop => "timer-stop",
            Self::NoteAdded => "note-added",
        }
    }
}

/// Append-only audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: ActivityId,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub pending_sync: bool,
}

impl ActivityLogEntry {
    /// Create a new local entry awaiting sync
    #[must_use]
    pub fn new(kind: ActivityKind, timestamp: DateTime<Utc>, user_id: Option<UserId>) -> Self {
        Self {
            id: ActivityId::new(),
            kind,
            timestamp,
            user_id,
            ticket_id: None,
            ticket_title: None,
            duration_ms: None,
            note: None,
            pending_sync: true,
        }
    }

    #[must_use]
    pub fn with_ticket(mut self, ticket_id: TicketId, ticket_title: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id);
        self.ticket_title = Some(ticket_title.into());
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}
