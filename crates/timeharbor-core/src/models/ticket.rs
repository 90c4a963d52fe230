//! Ticket and ticket note models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NoteId, TeamId, TicketId, UserId};

/// Workflow status of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Completed,
    Archived,
}

/// A note attached to a ticket; append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketNote {
    pub id: NoteId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    /// Not yet flushed through the ticket-update path
    #[serde(default)]
    pub pending_sync: bool,
}

impl TicketNote {
    /// Create a new local note awaiting sync
    #[must_use]
    pub fn new(content: impl Into<String>, created_by: UserId) -> Self {
        Self {
            id: NoteId::new(),
            content: content.into(),
            created_at: Utc::now(),
            created_by,
            pending_sync: true,
        }
    }
}

/// A ticket owned by a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub team_id: TeamId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TicketStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_ms: Option<i64>,
    /// Ordered, append-only note list; the server may omit it
    #[serde(default)]
    pub notes: Vec<TicketNote>,
    #[serde(default)]
    pub pending_sync: bool,
}

impl Ticket {
    /// Create a new local ticket awaiting sync
    #[must_use]
    pub fn new(team_id: TeamId, title: impl Into<String>, created_by: UserId) -> Self {
        Self {
            id: TicketId::new(),
            team_id,
            title: title.into(),
            description: None,
            status: TicketStatus::Open,
            created_by,
            created_at: Utc::now(),
            estimated_ms: None,
            notes: Vec::new(),
            pending_sync: true,
        }
    }

    /// Number of notes not yet flushed to the server
    #[must_use]
    pub fn pending_note_count(&self) -> usize {
        self.notes.iter().filter(|note| note.pending_sync).count()
    }
}

/// Partial update applied to a ticket's scalar fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TicketStatus>,
}

impl TicketUpdate {
    /// Apply the update to `ticket`, returning whether anything changed
    pub fn apply_to(self, ticket: &mut Ticket) -> bool {
        let before = (
            ticket.title.clone(),
            ticket.description.clone(),
            ticket.status,
        );
        if let Some(title) = self.title {
            ticket.title = title;
        }
        if let Some(description) = self.description {
            ticket.description = description;
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        before != (ticket.title.clone(), ticket.description.clone(), ticket.status)
    }
}
