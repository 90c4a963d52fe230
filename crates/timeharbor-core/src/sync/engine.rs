//! Sync engine: pushes the queue, then pulls and reconciles server state.

use std::future::pending;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::merge;
use super::network::NetworkMonitor;
use super::queue::SyncQueue;
use super::status::{StatusHub, SyncReport};
use crate::config::SyncSettings;
use crate::db::{metadata, Index, Store};
use crate::models::{ActivityLogEntry, EntityKind, Membership, Session, TeamId, User, UserId};
use crate::remote::RemoteDataService;
use crate::state::SyncStatus;
use crate::{Error, Result};

/// Result of a sync trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was already running; nothing was done
    AlreadyRunning,
    /// Connectivity was unavailable or lost mid-cycle
    Offline,
}

pub struct SyncEngine<R> {
    store: Store,
    queue: SyncQueue,
    remote: R,
    network: NetworkMonitor,
    status: StatusHub,
    settings: SyncSettings,
    enqueued: Arc<Notify>,
    cycle: Mutex<()>,
}

impl<R: RemoteDataService> SyncEngine<R> {
    pub fn new(
        queue: SyncQueue,
        remote: R,
        network: NetworkMonitor,
        status: StatusHub,
        settings: SyncSettings,
    ) -> Self {
        status.set_state(SyncStatus::initial(network.is_online()));
        Self {
            store: queue.store().clone(),
            enqueued: queue.enqueued(),
            queue,
            remote,
            network,
            status,
            settings,
            cycle: Mutex::new(()),
        }
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub fn status(&self) -> SyncStatus {
        self.status.state()
    }

    /// Run one sync cycle now.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] without waiting if a cycle is
    /// in flight.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        let Ok(_cycle) = self.cycle.try_lock() else {
            tracing::debug!("Sync already running, ignoring trigger");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        if !self.network.is_online() {
            self.status.set_state(SyncStatus::Offline);
            return Ok(SyncOutcome::Offline);
        }

        self.status.set_state(SyncStatus::Syncing);
        tracing::info!("Sync cycle started");

        match self.run_cycle().await {
            Ok(report) => {
                tracing::info!(
                    "Sync cycle finished: {} pushed, {} dropped, {} activity entries",
                    report.pushed,
                    report.dropped,
                    report.activity_pushed
                );
                self.status.set_state(SyncStatus::Idle);
                self.status.cycle_completed(report.clone());
                Ok(SyncOutcome::Completed(report))
            }
            Err(Error::Offline | Error::Remote(_)) if !self.network.is_online() => {
                tracing::info!("Sync cycle abandoned: network went offline");
                self.status.set_state(SyncStatus::Offline);
                Ok(SyncOutcome::Offline)
            }
            Err(error) => {
                tracing::error!("Sync cycle failed: {error}");
                self.status.set_state(SyncStatus::Error);
                // keep the pending count honest for whatever did get pushed
                self.queue.refresh_pending().await.ok();
                Err(error)
            }
        }
    }

    /// Apply a connectivity change reported by the platform
    pub async fn handle_connectivity(&self, online: bool) {
        self.network.set_online(online);
        if online {
            if self.status.state() == SyncStatus::Offline {
                self.status.set_state(SyncStatus::Idle);
            }
            self.trigger().await;
        } else {
            self.status.set_state(SyncStatus::Offline);
        }
    }

    /// Drive automatic syncing: connectivity changes, debounced enqueues and
    /// the periodic interval.
    ///
    /// Runs until the network monitor is dropped.
    pub async fn run(&self) {
        let mut online = self.network.subscribe();
        let mut periodic = self.settings.sync_interval().map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        if self.network.is_online() {
            self.trigger().await;
        }

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let is_online = *online.borrow_and_update();
                    self.handle_connectivity(is_online).await;
                }
                () = self.enqueued.notified() => {
                    tokio::time::sleep(self.settings.debounce()).await;
                    self.trigger().await;
                }
                () = tick(&mut periodic) => {
                    if self.network.is_online() {
                        self.trigger().await;
                    }
                }
            }
        }
    }

    async fn trigger(&self) {
        if let Err(error) = self.sync_now().await {
            tracing::warn!("Triggered sync failed: {error}");
        }
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let drained = self.queue.drain(&self.remote, &self.network).await?;
        let mut report = SyncReport {
            pushed: drained.pushed,
            dropped: drained.dropped,
            ..SyncReport::default()
        };

        let session: Option<Session> = self.store.metadata().get(metadata::SESSION).await?;
        match session {
            Some(Session {
                user_id,
                current_team_id: Some(team_id),
            }) => {
                report.activity_pushed = self.push_activity().await?;

                let pull_started = Utc::now();
                self.pull(&user_id, &team_id).await?;
                self.store
                    .metadata()
                    .set(metadata::LAST_SYNCED_AT, &pull_started)
                    .await?;
                self.status.set_last_synced_at(pull_started);
                report.pulled = true;
                report.synced_at = Some(pull_started);
            }
            _ => tracing::debug!("No active session, skipping pull"),
        }

        self.queue.refresh_pending().await?;
        Ok(report)
    }

    /// Send locally recorded activity and mark it synced
    async fn push_activity(&self) -> Result<usize> {
        let pending = self
            .store
            .activity_log()
            .get_by_index(Index::PendingSync, true)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let created = self
            .network
            .while_online(self.remote.create_activity_many(pending.clone()))
            .await??;

        let pushed = created.len();
        if pushed != pending.len() {
            tracing::warn!(
                "Server stored {pushed} of {} activity entries; the rest stay pending",
                pending.len()
            );
        }

        let mut batch = self.store.batch();
        for (local, mut server) in pending.iter().zip(created) {
            if server.id != local.id {
                batch.remove::<ActivityLogEntry>(local.id.as_str());
            }
            server.pending_sync = false;
            batch.put(&server)?;
        }
        batch.commit().await?;
        Ok(pushed)
    }

    async fn pull(&self, user_id: &UserId, team_id: &TeamId) -> Result<()> {
        let since: Option<DateTime<Utc>> =
            self.store.metadata().get(metadata::LAST_SYNCED_AT).await?;
        let network = &self.network;
        let remote = &self.remote;

        let teams = network
            .while_online(remote.list_teams_for_user(user_id))
            .await??;
        self.store.teams().replace_all(&teams).await?;

        let server_tickets = network.while_online(remote.list_tickets(team_id)).await??;
        let local_tickets = self
            .store
            .tickets()
            .get_by_index(Index::ByTeam, team_id)
            .await?;
        let queued_tickets = self.queue.pending_ids(EntityKind::Ticket).await?;
        let tickets = merge::merge_tickets(server_tickets, local_tickets, &queued_tickets);
        self.store
            .tickets()
            .replace_by_index(Index::ByTeam, team_id, &tickets)
            .await?;

        let server_entries = network
            .while_online(remote.list_time_entries_for_user(user_id, since))
            .await??;
        let local_entries = self
            .store
            .time_entries()
            .get_by_index(Index::ByUser, user_id)
            .await?;
        let entries = merge::merge_time_entries(server_entries, &local_entries);
        self.store.time_entries().put_many(&entries).await?;

        let server_assignments = network
            .while_online(remote.list_assignments(team_id))
            .await??;
        let local_assignments = self
            .store
            .assignments()
            .get_by_index(Index::ByTeam, team_id)
            .await?;
        let queued_assignments = self.queue.pending_ids(EntityKind::Assignment).await?;
        let assignments =
            merge::merge_assignments(server_assignments, &local_assignments, &queued_assignments);
        self.store
            .assignments()
            .replace_by_index(Index::ByTeam, team_id, &assignments)
            .await?;

        let members = network.while_online(remote.list_members(team_id)).await??;
        let (memberships, users): (Vec<Membership>, Vec<User>) = members
            .into_iter()
            .map(|member| (member.membership, member.user))
            .unzip();
        self.store
            .memberships()
            .replace_by_index(Index::ByTeam, team_id, &memberships)
            .await?;
        self.store.users().put_many(&users).await?;

        let server_activity = network
            .while_online(remote.list_activity(user_id, since))
            .await??;
        let local_activity = self
            .store
            .activity_log()
            .get_by_index(Index::PendingSync, true)
            .await?;
        let activity = merge::merge_activity(server_activity, &local_activity);
        self.store.activity_log().put_many(&activity).await?;

        tracing::debug!(
            "Pulled {} tickets, {} time entries, {} assignments for team {team_id}",
            tickets.len(),
            entries.len(),
            assignments.len()
        );
        Ok(())
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, Assignment, Member, Role, Team, Ticket, TimeEntry};
    use crate::testing::{init_tracing, FakeRemote};
    use crate::tracker::TimeTracker;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        engine: SyncEngine<FakeRemote>,
        tracker: TimeTracker,
        queue: SyncQueue,
        network: NetworkMonitor,
        status: StatusHub,
        store: Store,
    }

    fn fast_settings() -> SyncSettings {
        SyncSettings {
            retry_base_ms: 1,
            sync_interval_secs: None,
            ..SyncSettings::default()
        }
    }

    fn seeded_remote() -> FakeRemote {
        let remote = FakeRemote::default();
        remote.seed_team(Team {
            id: "team-1".into(),
            name: "Harbor crew".to_string(),
            description: None,
            created_at: Utc::now(),
        });
        remote.seed_member(Member {
            membership: Membership {
                user_id: "user-1".into(),
                team_id: "team-1".into(),
                role: Role::Owner,
                joined_at: Utc::now(),
            },
            user: User {
                id: "user-1".into(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                avatar_url: None,
            },
        });
        remote
    }

    async fn fixture(remote: FakeRemote, online: bool, settings: SyncSettings) -> Fixture {
        init_tracing();
        let store = Store::open_in_memory().await.unwrap();
        let session = Session {
            user_id: "user-1".into(),
            current_team_id: Some("team-1".into()),
        };
        store.metadata().set(metadata::SESSION, &session).await.unwrap();

        let status = StatusHub::new(SyncStatus::initial(online));
        let network = NetworkMonitor::new(online);
        let queue = SyncQueue::new(store.clone(), status.clone(), settings.clone());
        let tracker = TimeTracker::new(store.clone(), queue.clone());
        let engine = SyncEngine::new(queue.clone(), remote, network.clone(), status.clone(), settings);
        Fixture {
            engine,
            tracker,
            queue,
            network,
            status,
            store,
        }
    }

    async fn only_ticket(store: &Store) -> Ticket {
        let mut tickets = store.tickets().get_all().await.unwrap();
        assert_eq!(tickets.len(), 1);
        tickets.remove(0)
    }

    #[tokio::test]
    async fn test_offline_create_then_sync_and_note_merge() {
        let fx = fixture(seeded_remote(), false, fast_settings()).await;
        let team: TeamId = "team-1".into();

        let ticket = fx.tracker.create_ticket(&team, "T1", None).await.unwrap();
        assert_eq!(fx.queue.len().await.unwrap(), 1);
        assert!(only_ticket(&fx.store).await.pending_sync);

        fx.network.set_online(true);
        let outcome = fx.engine.sync_now().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle, got {outcome:?}");
        };
        assert_eq!(report.pushed, 1);
        assert!(report.pulled);
        assert_eq!(fx.engine.remote().call_count("tickets.create"), 1);
        assert!(fx.queue.is_empty().await.unwrap());
        let synced = only_ticket(&fx.store).await;
        assert_eq!(synced.id, ticket.id);
        assert!(!synced.pending_sync);
        assert_eq!(fx.status.snapshot().pending, 0);

        fx.network.set_online(false);
        let calls_before = fx.engine.remote().calls().len();
        fx.tracker.add_note(&ticket.id, "first note").await.unwrap();
        assert_eq!(only_ticket(&fx.store).await.notes.len(), 1);
        assert_eq!(fx.engine.remote().calls().len(), calls_before);
        assert_eq!(fx.status.snapshot().pending, 2);

        fx.network.set_online(true);
        fx.engine.sync_now().await.unwrap();
        // the backend does not store notes, so the pulled copy has none
        assert!(fx.engine.remote().tickets()[0].notes.is_empty());
        let merged = only_ticket(&fx.store).await;
        assert_eq!(merged.notes.len(), 1);
        assert_eq!(merged.notes[0].content, "first note");
        assert!(!merged.notes[0].pending_sync);
        assert_eq!(fx.status.snapshot().pending, 0);
        assert_eq!(fx.engine.remote().activity().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_offline_is_noop() {
        let fx = fixture(seeded_remote(), false, fast_settings()).await;
        fx.tracker.create_ticket(&"team-1".into(), "Offline", None).await.unwrap();

        let outcome = fx.engine.sync_now().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Offline);
        assert_eq!(fx.queue.len().await.unwrap(), 1);
        assert_eq!(fx.engine.status(), SyncStatus::Offline);
        assert!(fx.engine.remote().calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_run_one_cycle() {
        let fx = fixture(seeded_remote(), true, fast_settings()).await;
        fx.tracker.create_ticket(&"team-1".into(), "Once", None).await.unwrap();

        let (first, second) = tokio::join!(fx.engine.sync_now(), fx.engine.sync_now());
        let outcomes = [first.unwrap(), second.unwrap()];

        let completed = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, SyncOutcome::Completed(_)))
            .count();
        assert_eq!(completed, 1);
        assert!(outcomes.contains(&SyncOutcome::AlreadyRunning));
        assert_eq!(fx.engine.remote().call_count("tickets.create"), 1);
        assert_eq!(fx.engine.remote().call_count("teams.listForUser"), 1);
    }

    #[tokio::test]
    async fn test_pull_failure_sets_error_state() {
        let remote = seeded_remote();
        remote.fail_always("tickets.list");
        let fx = fixture(remote, true, fast_settings()).await;

        let result = fx.engine.sync_now().await;
        assert!(matches!(result, Err(Error::Remote(_))));
        assert_eq!(fx.engine.status(), SyncStatus::Error);
        let last: Option<DateTime<Utc>> =
            fx.store.metadata().get(metadata::LAST_SYNCED_AT).await.unwrap();
        assert_eq!(last, None);

        fx.engine.remote().recover("tickets.list");
        let outcome = fx.engine.sync_now().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(_)));
        assert_eq!(fx.engine.status(), SyncStatus::Idle);
        let last: Option<DateTime<Utc>> =
            fx.store.metadata().get(metadata::LAST_SYNCED_AT).await.unwrap();
        assert!(last.is_some());
        assert_eq!(fx.status.snapshot().last_synced_at, last);
    }

    #[tokio::test]
    async fn test_dropped_item_does_not_abort_cycle() {
        let remote = seeded_remote();
        remote.fail_always("tickets.create");
        let fx = fixture(remote, true, fast_settings()).await;
        let team: TeamId = "team-1".into();

        fx.tracker.create_ticket(&team, "Rejected", None).await.unwrap();
        fx.tracker.clock_in().await.unwrap();

        let outcome = fx.engine.sync_now().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle, got {outcome:?}");
        };
        assert_eq!(report.dropped, 1);
        assert_eq!(report.activity_pushed, 1);
        assert!(report.pulled);
        assert_eq!(fx.status.snapshot().permanent_failures, 1);
        assert!(fx.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_pull_stores_teams_members_and_server_tickets() {
        let remote = seeded_remote();
        remote.seed_ticket(Ticket {
            pending_sync: false,
            ..Ticket::new("team-1".into(), "From the server", "user-2".into())
        });
        let fx = fixture(remote, true, fast_settings()).await;

        fx.engine.sync_now().await.unwrap();
        assert_eq!(fx.store.teams().count().await.unwrap(), 1);
        assert_eq!(fx.store.memberships().count().await.unwrap(), 1);
        assert!(fx.store.users().get("user-1").await.unwrap().is_some());
        assert_eq!(only_ticket(&fx.store).await.title, "From the server");
    }

    #[tokio::test]
    async fn test_pull_keeps_queued_assignments_and_pending_entries() {
        let fx = fixture(seeded_remote(), true, fast_settings()).await;
        let team: TeamId = "team-1".into();
        let user: UserId = "user-1".into();

        let ticket = fx.tracker.create_ticket(&team, "Shared", None).await.unwrap();
        let queued = fx.tracker.assign(&ticket.id, &"user-2".into()).await.unwrap();
        let running = fx
            .tracker
            .clock_in_and_start_timer(&team, &ticket.id)
            .await
            .unwrap();
        let unqueued = Assignment::new(team.clone(), ticket.id.clone(), "user-5".into(), user.clone());
        fx.store.assignments().put(&unqueued).await.unwrap();

        let remote = fx.engine.remote();
        remote.seed_assignment(Assignment {
            assignee_user_id: "user-3".into(),
            ..queued.clone()
        });
        let server_only = Assignment::new(team.clone(), ticket.id.clone(), "user-4".into(), "user-4".into());
        remote.seed_assignment(server_only.clone());

        let mut stale = running.clone();
        stale.finish(running.start + chrono::Duration::minutes(5), Some("stale".to_string()));
        remote.seed_time_entry(stale);
        let server_entry = TimeEntry::start(
            user.clone(),
            team.clone(),
            "ticket-9".into(),
            Utc::now() - chrono::Duration::hours(2),
        );
        remote.seed_time_entry(server_entry.clone());

        // pull without draining, so every local change is still queued
        fx.engine.pull(&user, &team).await.unwrap();

        let kept = fx.store.time_entries().get(running.id.as_str()).await.unwrap().unwrap();
        assert!(kept.is_running());
        assert!(kept.pending_sync);
        assert_eq!(kept.note, None);
        let pulled = fx.store.time_entries().get(server_entry.id.as_str()).await.unwrap().unwrap();
        assert!(!pulled.pending_sync);

        let mut assignees: Vec<(String, String)> = fx
            .store
            .assignments()
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|assignment| (assignment.id.to_string(), assignment.assignee_user_id.to_string()))
            .collect();
        assignees.sort();
        let mut expected = vec![
            (queued.id.to_string(), "user-2".to_string()),
            (server_only.id.to_string(), "user-4".to_string()),
        ];
        expected.sort();
        assert_eq!(assignees, expected);

        let server_copy = remote
            .assignments()
            .into_iter()
            .find(|assignment| assignment.id == queued.id)
            .unwrap();
        assert_eq!(server_copy.assignee_user_id, UserId::from("user-3"));
        assert_eq!(fx.queue.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incremental_pull_fetches_entries_since_last_sync() {
        let remote = seeded_remote();
        let entry_at =
            |at: DateTime<Utc>| TimeEntry::start("user-1".into(), "team-1".into(), "ticket-1".into(), at);
        let first = entry_at(Utc::now() - chrono::Duration::hours(3));
        remote.seed_time_entry(first.clone());
        let fx = fixture(remote, true, fast_settings()).await;

        fx.engine.sync_now().await.unwrap();
        assert_eq!(fx.store.time_entries().count().await.unwrap(), 1);
        let last: DateTime<Utc> = fx
            .store
            .metadata()
            .get(metadata::LAST_SYNCED_AT)
            .await
            .unwrap()
            .unwrap();

        let backdated = entry_at(last - chrono::Duration::hours(1));
        let fresh = entry_at(last + chrono::Duration::seconds(1));
        fx.engine.remote().seed_time_entry(backdated);
        fx.engine.remote().seed_time_entry(fresh.clone());
        fx.engine.sync_now().await.unwrap();

        let mut ids: Vec<String> = fx
            .store
            .time_entries()
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.id.to_string())
            .collect();
        ids.sort();
        let mut expected = vec![first.id.to_string(), fresh.id.to_string()];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(fx.engine.remote().time_entries().len(), 3);
        assert_eq!(fx.engine.remote().call_count("time.listForUser"), 2);
    }

    #[tokio::test]
    async fn test_short_activity_response_leaves_rest_pending() {
        let remote = seeded_remote();
        remote.limit_activity_batch(Some(1));
        let fx = fixture(remote, true, fast_settings()).await;
        fx.tracker.clock_in().await.unwrap();
        fx.tracker.clock_out().await.unwrap();

        let outcome = fx.engine.sync_now().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle, got {outcome:?}");
        };
        assert_eq!(report.activity_pushed, 1);
        let pending = fx
            .store
            .activity_log()
            .get_by_index(Index::PendingSync, true)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ActivityKind::ClockOut);

        fx.engine.remote().limit_activity_batch(None);
        let outcome = fx.engine.sync_now().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle, got {outcome:?}");
        };
        assert_eq!(report.activity_pushed, 1);
        assert_eq!(fx.engine.remote().activity().len(), 2);
        assert!(fx
            .store
            .activity_log()
            .get_by_index(Index::PendingSync, true)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_debounces_enqueue_trigger() {
        let fx = fixture(seeded_remote(), true, fast_settings()).await;
        let remote = fx.engine.remote();

        let driver = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fx.tracker.create_ticket(&"team-1".into(), "Debounced", None).await.unwrap();

            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(remote.call_count("tickets.create"), 0);

            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(remote.call_count("tickets.create"), 1);
        };

        tokio::select! {
            biased;
            () = driver => {}
            () = fx.engine.run() => panic!("run loop exited"),
        }
        assert!(fx.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_reconnect_triggers_sync() {
        let fx = fixture(seeded_remote(), false, fast_settings()).await;
        fx.tracker.create_ticket(&"team-1".into(), "Queued", None).await.unwrap();

        fx.engine.handle_connectivity(true).await;
        assert_eq!(fx.engine.remote().call_count("tickets.create"), 1);
        assert_eq!(fx.engine.status(), SyncStatus::Idle);

        fx.engine.handle_connectivity(false).await;
        assert_eq!(fx.engine.status(), SyncStatus::Offline);
    }
}
