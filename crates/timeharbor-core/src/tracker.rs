//! Local mutations for tickets, notes, assignments and time tracking.
//!
//! Every operation commits its local write and the matching queue item in
//! one transaction. Nothing here touches the network.

use chrono::{DateTime, Utc};

use crate::db::{metadata, Index, Store};
use crate::models::{
    elapsed_ms, ActiveTimer, ActivityKind, ActivityLogEntry, Assignment, AssignmentId, Change,
    ClockState, Session, SyncMutation, TeamId, Ticket, TicketId, TicketNote, TicketUpdate,
    TimeEntry, TimeEntryId, UserId,
};
use crate::sync::SyncQueue;
use crate::util::{local_day_start, normalize_text_option};
use crate::{Error, Result};

/// Entity mutation layer over an explicit store and queue
#[derive(Clone)]
pub struct TimeTracker {
    store: Store,
    queue: SyncQueue,
}

impl TimeTracker {
    pub const fn new(store: Store, queue: SyncQueue) -> Self {
        Self { store, queue }
    }

    async fn session(&self) -> Result<Session> {
        self.store
            .metadata()
            .get(metadata::SESSION)
            .await?
            .ok_or(Error::NoSession)
    }

    async fn ticket(&self, id: &TicketId) -> Result<Ticket> {
        self.store
            .tickets()
            .get(id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))
    }

    // Tickets

    pub async fn create_ticket(
        &self,
        team_id: &TeamId,
        title: &str,
        description: Option<String>,
    ) -> Result<Ticket> {
        let title = normalize_text_option(Some(title.to_string()))
            .ok_or_else(|| Error::InvalidInput("Ticket title cannot be empty".to_string()))?;
        let session = self.session().await?;

        let mut ticket = Ticket::new(team_id.clone(), title, session.user_id);
        ticket.description = normalize_text_option(description);

        let mut batch = self.store.batch();
        batch.put(&ticket)?;
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::Ticket(Change::Create(ticket.clone())),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        tracing::debug!("Created ticket {} for team {team_id}", ticket.id);
        Ok(ticket)
    }

    /// Apply `update`; an update that changes nothing is not queued
    pub async fn update_ticket(&self, id: &TicketId, update: TicketUpdate) -> Result<Ticket> {
        let mut ticket = self.ticket(id).await?;
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "Ticket title cannot be empty".to_string(),
                ));
            }
        }
        if !update.apply_to(&mut ticket) {
            return Ok(ticket);
        }

        ticket.pending_sync = true;
        let mut batch = self.store.batch();
        batch.put(&ticket)?;
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::Ticket(Change::Update(ticket.clone())),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(ticket)
    }

    pub async fn delete_ticket(&self, id: &TicketId) -> Result<()> {
        let ticket = self.ticket(id).await?;
        let mut batch = self.store.batch();
        batch.remove::<Ticket>(id.as_str());
        let item = SyncQueue::stage(&mut batch, SyncMutation::Ticket(Change::Delete(ticket)))?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        tracing::debug!("Deleted ticket {id}");
        Ok(())
    }

    /// Append a note; it travels to the server with the next ticket update
    pub async fn add_note(&self, ticket_id: &TicketId, content: &str) -> Result<TicketNote> {
        let content = normalize_text_option(Some(content.to_string()))
            .ok_or_else(|| Error::InvalidInput("Note cannot be empty".to_string()))?;
        let session = self.session().await?;
        let mut ticket = self.ticket(ticket_id).await?;

        let note = TicketNote::new(content, session.user_id.clone());
        ticket.notes.push(note.clone());
        ticket.pending_sync = true;

        let activity = ActivityLogEntry::new(ActivityKind::NoteAdded, note.created_at, Some(session.user_id))
            .with_ticket(ticket.id.clone(), ticket.title.clone())
            .with_note(Some(note.content.clone()));

        let mut batch = self.store.batch();
        batch.put(&ticket)?.put(&activity)?;
        let item = SyncQueue::stage(&mut batch, SyncMutation::Ticket(Change::Update(ticket)))?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(note)
    }

    // Assignments

    pub async fn assign(&self, ticket_id: &TicketId, assignee: &UserId) -> Result<Assignment> {
        let session = self.session().await?;
        let ticket = self.ticket(ticket_id).await?;
        let assignment = Assignment::new(
            ticket.team_id,
            ticket.id,
            assignee.clone(),
            session.user_id,
        );

        let mut batch = self.store.batch();
        batch.put(&assignment)?;
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::Assignment(Change::Create(assignment.clone())),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(assignment)
    }

    pub async fn reassign(&self, id: &AssignmentId, assignee: &UserId) -> Result<Assignment> {
        let mut assignment = self.assignment(id).await?;
        if assignment.assignee_user_id == *assignee {
            return Ok(assignment);
        }
        assignment.assignee_user_id = assignee.clone();

        let mut batch = self.store.batch();
        batch.put(&assignment)?;
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::Assignment(Change::Update(assignment.clone())),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(assignment)
    }

    pub async fn unassign(&self, id: &AssignmentId) -> Result<()> {
        let assignment = self.assignment(id).await?;
        let mut batch = self.store.batch();
        batch.remove::<Assignment>(id.as_str());
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::Assignment(Change::Delete(assignment)),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(())
    }

    async fn assignment(&self, id: &AssignmentId) -> Result<Assignment> {
        self.store
            .assignments()
            .get(id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(format!("assignment {id}")))
    }

    // Clock and timer

    pub async fn clock_state(&self) -> Result<ClockState> {
        Ok(self
            .store
            .metadata()
            .get(metadata::CLOCKED_IN_STATE)
            .await?
            .unwrap_or_default())
    }

    pub async fn active_timer(&self) -> Result<Option<ActiveTimer>> {
        self.store.metadata().get(metadata::ACTIVE_TIMER).await
    }

    /// Elapsed milliseconds of the running timer at `now`
    pub async fn elapsed(&self, now: DateTime<Utc>) -> Result<Option<i64>> {
        Ok(self.active_timer().await?.map(|timer| timer.elapsed_ms(now)))
    }

    /// Clock in to the session's current team.
    ///
    /// Returns the existing state if already clocked in.
    pub async fn clock_in(&self) -> Result<ClockState> {
        let state = self.clock_state().await?;
        if state.is_clocked_in {
            return Ok(state);
        }
        let session = self.session().await?;
        let now = Utc::now();
        let state = ClockState {
            is_clocked_in: true,
            clocked_in_at: Some(now),
            clocked_in_team_id: session.current_team_id,
        };
        let activity = ActivityLogEntry::new(ActivityKind::ClockIn, now, Some(session.user_id));

        let mut batch = self.store.batch();
        batch
            .set_metadata(metadata::CLOCKED_IN_STATE, &state)?
            .put(&activity)?;
        batch.commit().await?;
        tracing::info!("Clocked in");
        Ok(state)
    }

    pub async fn clock_in_and_start_timer(
        &self,
        team_id: &TeamId,
        ticket_id: &TicketId,
    ) -> Result<TimeEntry> {
        self.clock_in().await?;
        self.start_timer(team_id, ticket_id).await
    }

    /// Clock out, stopping any running timer first.
    ///
    /// Returns the clocked-in duration in milliseconds.
    pub async fn clock_out(&self) -> Result<i64> {
        let state = self.clock_state().await?;
        if !state.is_clocked_in {
            return Err(Error::NotClockedIn);
        }
        self.stop_timer(None).await?;

        let session = self.session().await?;
        let now = Utc::now();
        let duration_ms = state
            .clocked_in_at
            .map_or(0, |clocked_in_at| elapsed_ms(clocked_in_at, now));
        let activity = ActivityLogEntry::new(ActivityKind::ClockOut, now, Some(session.user_id))
            .with_duration(duration_ms);

        let mut batch = self.store.batch();
        batch
            .set_metadata(metadata::CLOCKED_IN_STATE, &ClockState::default())?
            .put(&activity)?;
        batch.commit().await?;
        tracing::info!("Clocked out after {duration_ms} ms");
        Ok(duration_ms)
    }

    /// Start timing `ticket_id`, stopping the running timer if there is one.
    pub async fn start_timer(&self, team_id: &TeamId, ticket_id: &TicketId) -> Result<TimeEntry> {
        if !self.clock_state().await?.is_clocked_in {
            return Err(Error::NotClockedIn);
        }
        let session = self.session().await?;
        let ticket = self.ticket(ticket_id).await?;
        if self.active_timer().await?.is_some() {
            self.stop_timer(None).await?;
        }

        let entry = TimeEntry::start(
            session.user_id.clone(),
            team_id.clone(),
            ticket.id.clone(),
            Utc::now(),
        );
        let timer = ActiveTimer {
            team_id: team_id.clone(),
            ticket_id: ticket.id.clone(),
            time_entry_id: entry.id.clone(),
            started_at: entry.start,
        };
        let activity = ActivityLogEntry::new(ActivityKind::TimerStart, entry.start, Some(session.user_id))
            .with_ticket(ticket.id, ticket.title);

        let mut batch = self.store.batch();
        batch
            .put(&entry)?
            .put(&activity)?
            .set_metadata(metadata::ACTIVE_TIMER, &timer)?;
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::TimeEntry(Change::Create(entry.clone())),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        tracing::debug!("Started timer {} on ticket {ticket_id}", entry.id);
        Ok(entry)
    }

    /// Stop the running timer; `None` when nothing is running
    pub async fn stop_timer(&self, note: Option<String>) -> Result<Option<TimeEntry>> {
        let Some(timer) = self.active_timer().await? else {
            return Ok(None);
        };
        let user_id = self
            .store
            .metadata()
            .get::<Session>(metadata::SESSION)
            .await?
            .map(|session| session.user_id);
        let now = Utc::now();
        let note = normalize_text_option(note);

        let title = self
            .store
            .tickets()
            .get(timer.ticket_id.as_str())
            .await?
            .map_or_else(|| "Unknown ticket".to_string(), |ticket| ticket.title);
        let activity = ActivityLogEntry::new(ActivityKind::TimerStop, now, user_id)
            .with_ticket(timer.ticket_id.clone(), title)
            .with_duration(timer.elapsed_ms(now))
            .with_note(note.clone());

        let entry = self
            .store
            .time_entries()
            .get(timer.time_entry_id.as_str())
            .await?;
        let mut batch = self.store.batch();
        batch
            .remove_metadata(metadata::ACTIVE_TIMER)
            .put(&activity)?;

        let Some(mut entry) = entry else {
            tracing::warn!(
                "Active timer referenced missing time entry {}",
                timer.time_entry_id
            );
            batch.commit().await?;
            return Ok(None);
        };

        entry.finish(now, note);
        batch.put(&entry)?;
        let item = SyncQueue::stage(
            &mut batch,
            SyncMutation::TimeEntry(Change::Update(entry.clone())),
        )?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(Some(entry))
    }

    pub async fn delete_time_entry(&self, id: &TimeEntryId) -> Result<()> {
        let entry = self
            .store
            .time_entries()
            .get(id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(format!("time entry {id}")))?;

        let mut batch = self.store.batch();
        batch.remove::<TimeEntry>(id.as_str());
        if self
            .active_timer()
            .await?
            .is_some_and(|timer| timer.time_entry_id == *id)
        {
            batch.remove_metadata(metadata::ACTIVE_TIMER);
        }
        let item = SyncQueue::stage(&mut batch, SyncMutation::TimeEntry(Change::Delete(entry)))?;
        batch.commit().await?;
        self.queue.committed(&item).await;
        Ok(())
    }

    // Totals

    /// Milliseconds worked in `[from, to)`: completed clock-outs plus the
    /// open clock-in, if it started inside the window.
    pub async fn worked_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<i64> {
        let completed: i64 = self
            .store
            .activity_log()
            .get_by_index(Index::ByType, ActivityKind::ClockOut.as_str())
            .await?
            .iter()
            .filter(|entry| entry.timestamp >= from && entry.timestamp < to)
            .filter_map(|entry| entry.duration_ms)
            .sum();

        let state = self.clock_state().await?;
        let running = match state.clocked_in_at {
            Some(clocked_in_at) if state.is_clocked_in && clocked_in_at >= from => {
                elapsed_ms(clocked_in_at, to)
            }
            _ => 0,
        };
        Ok(completed + running)
    }

    /// Time worked since local midnight
    pub async fn today_total(&self, now: DateTime<Utc>) -> Result<i64> {
        self.worked_between(local_day_start(now), now).await
    }
}
