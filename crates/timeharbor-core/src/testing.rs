//! In-memory scripted backend for tests.
//!
//! Records every call in order, can be told to fail specific operations and
//! mimics the reference backend: notes are not stored server-side.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::models::{
    ActivityLogEntry, Assignment, AssignmentId, Member, Team, TeamId, Ticket, TicketId,
    TimeEntry, TimeEntryId, EntrySource, UserId,
};
use crate::remote::{
    AssignmentPatch, AuthSession, NewAssignment, NewTicket, NewTimeEntry, RemoteDataService,
    RemoteError, RemoteResult, TicketPatch, TimeEntryPatch,
};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct FakeState {
    calls: Vec<(&'static str, Instant)>,
    fail_always: HashSet<&'static str>,
    fail_next: HashMap<&'static str, usize>,
    server_ids: bool,
    next_id: u64,
    session: Option<AuthSession>,
    signed_in: bool,
    teams: Vec<Team>,
    members: Vec<Member>,
    tickets: Vec<Ticket>,
    created_titles: Vec<String>,
    time_entries: Vec<TimeEntry>,
    assignments: Vec<Assignment>,
    activity: Vec<ActivityLogEntry>,
    activity_batch_limit: Option<usize>,
}

impl FakeState {
    fn issue_id(&mut self, kind: &str, proposed: Option<String>) -> String {
        match proposed {
            Some(id) if !self.server_ids => id,
            _ => {
                self.next_id += 1;
                format!("srv-{kind}-{}", self.next_id)
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    /// Assign fresh server ids instead of honoring proposed ones
    pub(crate) fn with_server_ids(self) -> Self {
        self.lock().server_ids = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn fail_always(&self, op: &'static str) {
        self.lock().fail_always.insert(op);
    }

    pub(crate) fn fail_next(&self, op: &'static str, times: usize) {
        self.lock().fail_next.insert(op, times);
    }

    /// Accept at most `limit` entries per `createMany` call
    pub(crate) fn limit_activity_batch(&self, limit: Option<usize>) {
        self.lock().activity_batch_limit = limit;
    }

    pub(crate) fn recover(&self, op: &'static str) {
        let mut state = self.lock();
        state.fail_always.remove(op);
        state.fail_next.remove(op);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(|(op, _)| *op).collect()
    }

    pub(crate) fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|(name, _)| *name == op).count()
    }

    pub(crate) fn call_times(&self, op: &str) -> Vec<Instant> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| *name == op)
            .map(|(_, at)| *at)
            .collect()
    }

    pub(crate) fn created_ticket_titles(&self) -> Vec<String> {
        self.lock().created_titles.clone()
    }

    pub(crate) fn tickets(&self) -> Vec<Ticket> {
        self.lock().tickets.clone()
    }

    pub(crate) fn time_entries(&self) -> Vec<TimeEntry> {
        self.lock().time_entries.clone()
    }

    pub(crate) fn assignments(&self) -> Vec<Assignment> {
        self.lock().assignments.clone()
    }

    pub(crate) fn activity(&self) -> Vec<ActivityLogEntry> {
        self.lock().activity.clone()
    }

    pub(crate) fn seed_session(&self, session: AuthSession) {
        self.lock().session = Some(session);
    }

    pub(crate) fn seed_team(&self, team: Team) {
        self.lock().teams.push(team);
    }

    pub(crate) fn seed_member(&self, member: Member) {
        self.lock().members.push(member);
    }

    pub(crate) fn seed_ticket(&self, ticket: Ticket) {
        self.lock().tickets.push(Ticket {
            notes: Vec::new(),
            pending_sync: false,
            ..ticket
        });
    }

    pub(crate) fn seed_time_entry(&self, entry: TimeEntry) {
        self.lock().time_entries.push(TimeEntry {
            pending_sync: false,
            ..entry
        });
    }

    pub(crate) fn seed_assignment(&self, assignment: Assignment) {
        self.lock().assignments.push(assignment);
    }

    async fn call(&self, op: &'static str) -> RemoteResult<()> {
        let outcome = {
            let mut state = self.lock();
            state.calls.push((op, Instant::now()));
            let scripted = match state.fail_next.get_mut(op) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            if scripted || state.fail_always.contains(op) {
                Err(RemoteError::Network(format!("{op} unreachable")))
            } else {
                Ok(())
            }
        };
        tokio::task::yield_now().await;
        outcome
    }
}

fn newer_than(at: DateTime<Utc>, since: Option<DateTime<Utc>>) -> bool {
    since.is_none_or(|since| at > since)
}

impl RemoteDataService for FakeRemote {
    async fn get_session(&self) -> RemoteResult<Option<AuthSession>> {
        self.call("auth.getSession").await?;
        let state = self.lock();
        Ok(state.session.clone().filter(|_| state.signed_in))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> RemoteResult<AuthSession> {
        self.call("auth.signIn").await?;
        let mut state = self.lock();
        let session = state
            .session
            .clone()
            .filter(|session| session.user.email == email)
            .ok_or(RemoteError::Unauthorized)?;
        state.signed_in = true;
        Ok(session)
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.call("auth.signOut").await?;
        self.lock().signed_in = false;
        Ok(())
    }

    async fn list_teams_for_user(&self, user_id: &UserId) -> RemoteResult<Vec<Team>> {
        self.call("teams.listForUser").await?;
        let state = self.lock();
        let team_ids: HashSet<&TeamId> = state
            .members
            .iter()
            .filter(|member| member.membership.user_id == *user_id)
            .map(|member| &member.membership.team_id)
            .collect();
        Ok(state
            .teams
            .iter()
            .filter(|team| team_ids.contains(&team.id))
            .cloned()
            .collect())
    }

    async fn get_team(&self, team_id: &TeamId) -> RemoteResult<Option<Team>> {
        self.call("teams.get").await?;
        Ok(self.lock().teams.iter().find(|team| team.id == *team_id).cloned())
    }

    async fn list_tickets(&self, team_id: &TeamId) -> RemoteResult<Vec<Ticket>> {
        self.call("tickets.list").await?;
        Ok(self
            .lock()
            .tickets
            .iter()
            .filter(|ticket| ticket.team_id == *team_id)
            .cloned()
            .collect())
    }

    async fn create_ticket(&self, team_id: &TeamId, ticket: NewTicket) -> RemoteResult<Ticket> {
        self.call("tickets.create").await?;
        let mut state = self.lock();
        let id = state.issue_id("ticket", ticket.id.map(|id| id.to_string()));
        let created = Ticket {
            id: TicketId::from(id),
            team_id: team_id.clone(),
            title: ticket.title,
            description: ticket.description,
            status: ticket.status,
            created_by: ticket.created_by,
            created_at: Utc::now(),
            estimated_ms: ticket.estimated_ms,
            notes: Vec::new(),
            pending_sync: false,
        };
        state.created_titles.push(created.title.clone());
        state.tickets.push(created.clone());
        Ok(created)
    }

    async fn update_ticket(&self, id: &TicketId, patch: TicketPatch) -> RemoteResult<Ticket> {
        self.call("tickets.update").await?;
        let mut state = self.lock();
        let ticket = state
            .tickets
            .iter_mut()
            .find(|ticket| ticket.id == *id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        ticket.title = patch.title;
        ticket.description = patch.description;
        ticket.status = patch.status;
        Ok(ticket.clone())
    }

    async fn delete_ticket(&self, id: &TicketId) -> RemoteResult<()> {
        self.call("tickets.delete").await?;
        let mut state = self.lock();
        let before = state.tickets.len();
        state.tickets.retain(|ticket| ticket.id != *id);
        if state.tickets.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn create_time_entry(&self, entry: NewTimeEntry) -> RemoteResult<TimeEntry> {
        self.call("time.create").await?;
        let mut state = self.lock();
        let id = state.issue_id("entry", entry.id.map(|id| id.to_string()));
        let created = TimeEntry {
            id: TimeEntryId::from(id),
            user_id: entry.user_id,
            team_id: entry.team_id,
            ticket_id: entry.ticket_id,
            start: entry.start,
            end: entry.end,
            duration_ms: entry.duration_ms,
            note: entry.note,
            source: EntrySource::Local,
            pending_sync: false,
            created_at: Utc::now(),
        };
        state.time_entries.push(created.clone());
        Ok(created)
    }

    async fn update_time_entry(
        &self,
        id: &TimeEntryId,
        patch: TimeEntryPatch,
    ) -> RemoteResult<TimeEntry> {
        self.call("time.update").await?;
        let mut state = self.lock();
        let entry = state
            .time_entries
            .iter_mut()
            .find(|entry| entry.id == *id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        entry.end = patch.end;
        entry.duration_ms = patch.duration_ms;
        entry.note = patch.note;
        Ok(entry.clone())
    }

    async fn delete_time_entry(&self, id: &TimeEntryId) -> RemoteResult<()> {
        self.call("time.delete").await?;
        let mut state = self.lock();
        let before = state.time_entries.len();
        state.time_entries.retain(|entry| entry.id != *id);
        if state.time_entries.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_time_entries(
        &self,
        team_id: &TeamId,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<TimeEntry>> {
        self.call("time.list").await?;
        Ok(self
            .lock()
            .time_entries
            .iter()
            .filter(|entry| entry.team_id == *team_id && newer_than(entry.created_at, since))
            .cloned()
            .collect())
    }

    async fn list_time_entries_for_user(
        &self,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<TimeEntry>> {
        self.call("time.listForUser").await?;
        Ok(self
            .lock()
            .time_entries
            .iter()
            .filter(|entry| entry.user_id == *user_id && newer_than(entry.created_at, since))
            .cloned()
            .collect())
    }

    async fn list_members(&self, team_id: &TeamId) -> RemoteResult<Vec<Member>> {
        self.call("members.list").await?;
        Ok(self
            .lock()
            .members
            .iter()
            .filter(|member| member.membership.team_id == *team_id)
            .cloned()
            .collect())
    }

    async fn list_assignments(&self, team_id: &TeamId) -> RemoteResult<Vec<Assignment>> {
        self.call("assignments.list").await?;
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|assignment| assignment.team_id == *team_id)
            .cloned()
            .collect())
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> RemoteResult<Assignment> {
        self.call("assignments.create").await?;
        let mut state = self.lock();
        let id = state.issue_id("assignment", assignment.id.map(|id| id.to_string()));
        let created = Assignment {
            id: AssignmentId::from(id),
            team_id: assignment.team_id,
            ticket_id: assignment.ticket_id,
            assignee_user_id: assignment.assignee_user_id,
            assigned_by: assignment.assigned_by,
            assigned_at: Utc::now(),
        };
        state.assignments.push(created.clone());
        Ok(created)
    }

    async fn update_assignment(
        &self,
        id: &AssignmentId,
        patch: AssignmentPatch,
    ) -> RemoteResult<Assignment> {
        self.call("assignments.update").await?;
        let mut state = self.lock();
        let assignment = state
            .assignments
            .iter_mut()
            .find(|assignment| assignment.id == *id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        assignment.assignee_user_id = patch.assignee_user_id;
        Ok(assignment.clone())
    }

    async fn delete_assignment(&self, id: &AssignmentId) -> RemoteResult<()> {
        self.call("assignments.delete").await?;
        let mut state = self.lock();
        let before = state.assignments.len();
        state.assignments.retain(|assignment| assignment.id != *id);
        if state.assignments.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_activity(
        &self,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<ActivityLogEntry>> {
        self.call("activityLog.list").await?;
        Ok(self
            .lock()
            .activity
            .iter()
            .filter(|entry| {
                entry.user_id.as_ref() == Some(user_id) && newer_than(entry.timestamp, since)
            })
            .cloned()
            .collect())
    }

    async fn create_activity(&self, entry: ActivityLogEntry) -> RemoteResult<ActivityLogEntry> {
        self.call("activityLog.create").await?;
        let stored = ActivityLogEntry {
            pending_sync: false,
            ..entry
        };
        self.lock().activity.push(stored.clone());
        Ok(stored)
    }

    async fn create_activity_many(
        &self,
        entries: Vec<ActivityLogEntry>,
    ) -> RemoteResult<Vec<ActivityLogEntry>> {
        self.call("activityLog.createMany").await?;
        let mut state = self.lock();
        let limit = state.activity_batch_limit.unwrap_or(usize::MAX);
        let stored: Vec<ActivityLogEntry> = entries
            .into_iter()
            .take(limit)
            .map(|entry| ActivityLogEntry {
                pending_sync: false,
                ..entry
            })
            .collect();
        state.activity.extend(stored.iter().cloned());
        Ok(stored)
    }
}
