//! Remote data service boundary
//!
//! The engine only ever talks to the backend through [`RemoteDataService`].
//! Payload types mirror what the backend accepts. The `New*` types carry the
//! locally generated id as a proposal; the server may assign its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    ActivityLogEntry, Assignment, AssignmentId, Member, Membership, Team, TeamId, Ticket,
    TicketId, TicketNote, TicketStatus, TimeEntry, TimeEntryId, User, UserId,
};

/// Failure talking to the backend.
///
/// Every variant is treated as transient by the sync queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Remote entity not found: {0}")]
    NotFound(String),

    #[error("Not authorized")]
    Unauthorized,
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// An authenticated user with their team memberships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: User,
    pub memberships: Vec<Membership>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TicketId>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TicketStatus,
    pub created_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_ms: Option<i64>,
    #[serde(default)]
    pub notes: Vec<TicketNote>,
}

impl From<&Ticket> for NewTicket {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: Some(ticket.id.clone()),
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: ticket.status,
            created_by: ticket.created_by.clone(),
            estimated_ms: ticket.estimated_ms,
            notes: ticket.notes.clone(),
        }
    }
}

/// Ticket fields sent on update; notes travel as the full list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub notes: Vec<TicketNote>,
}

impl From<&Ticket> for TicketPatch {
    fn from(ticket: &Ticket) -> Self {
        Self {
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: ticket.status,
            notes: ticket.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TimeEntryId>,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub ticket_id: TicketId,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub note: Option<String>,
}

impl From<&TimeEntry> for NewTimeEntry {
    fn from(entry: &TimeEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            user_id: entry.user_id.clone(),
            team_id: entry.team_id.clone(),
            ticket_id: entry.ticket_id.clone(),
            start: entry.start,
            end: entry.end,
            duration_ms: entry.duration_ms,
            note: entry.note.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryPatch {
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub note: Option<String>,
}

impl From<&TimeEntry> for TimeEntryPatch {
    fn from(entry: &TimeEntry) -> Self {
        Self {
            end: entry.end,
            duration_ms: entry.duration_ms,
            note: entry.note.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssignmentId>,
    pub team_id: TeamId,
    pub ticket_id: TicketId,
    pub assignee_user_id: UserId,
    pub assigned_by: UserId,
}

impl From<&Assignment> for NewAssignment {
    fn from(assignment: &Assignment) -> Self {
        Self {
            id: Some(assignment.id.clone()),
            team_id: assignment.team_id.clone(),
            ticket_id: assignment.ticket_id.clone(),
            assignee_user_id: assignment.assignee_user_id.clone(),
            assigned_by: assignment.assigned_by.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPatch {
    pub assignee_user_id: UserId,
}

/// Backend contract used by the sync engine and session handling.
///
/// Calls are plain futures; the engine drives them on the caller's task.
#[allow(async_fn_in_trait)]
pub trait RemoteDataService {
    // auth
    async fn get_session(&self) -> RemoteResult<Option<AuthSession>>;
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<AuthSession>;
    async fn sign_out(&self) -> RemoteResult<()>;

    // teams
    async fn list_teams_for_user(&self, user_id: &UserId) -> RemoteResult<Vec<Team>>;
    async fn get_team(&self, team_id: &TeamId) -> RemoteResult<Option<Team>>;

    // tickets
    async fn list_tickets(&self, team_id: &TeamId) -> RemoteResult<Vec<Ticket>>;
    async fn create_ticket(&self, team_id: &TeamId, ticket: NewTicket) -> RemoteResult<Ticket>;
    async fn update_ticket(&self, id: &TicketId, patch: TicketPatch) -> RemoteResult<Ticket>;
    async fn delete_ticket(&self, id: &TicketId) -> RemoteResult<()>;

    // time
    async fn create_time_entry(&self, entry: NewTimeEntry) -> RemoteResult<TimeEntry>;
    async fn update_time_entry(
        &self,
        id: &TimeEntryId,
        patch: TimeEntryPatch,
    ) -> RemoteResult<TimeEntry>;
    async fn delete_time_entry(&self, id: &TimeEntryId) -> RemoteResult<()>;
    async fn list_time_entries(
        &self,
        team_id: &TeamId,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<TimeEntry>>;
    async fn list_time_entries_for_user(
        &self,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<TimeEntry>>;

    // members
    async fn list_members(&self, team_id: &TeamId) -> RemoteResult<Vec<Member>>;

    // assignments
    async fn list_assignments(&self, team_id: &TeamId) -> RemoteResult<Vec<Assignment>>;
    async fn create_assignment(&self, assignment: NewAssignment) -> RemoteResult<Assignment>;
    async fn update_assignment(
        &self,
        id: &AssignmentId,
        patch: AssignmentPatch,
    ) -> RemoteResult<Assignment>;
    async fn delete_assignment(&self, id: &AssignmentId) -> RemoteResult<()>;

    // activity log
    async fn list_activity(
        &self,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<ActivityLogEntry>>;
    async fn create_activity(&self, entry: ActivityLogEntry) -> RemoteResult<ActivityLogEntry>;
    async fn create_activity_many(
        &self,
        entries: Vec<ActivityLogEntry>,
    ) -> RemoteResult<Vec<ActivityLogEntry>>;
}
