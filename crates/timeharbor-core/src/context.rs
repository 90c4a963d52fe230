//! Application context wiring the store, queue, tracker and sync engine.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SyncSettings;
use crate::db::{metadata, Store};
use crate::models::{Membership, Session, TeamId};
use crate::remote::{AuthSession, RemoteDataService};
use crate::state::SyncStatus;
use crate::sync::{NetworkMonitor, StatusHub, SyncEngine, SyncOutcome, SyncQueue};
use crate::tracker::TimeTracker;
use crate::{Error, Result};

/// Everything a client needs, built once at startup and passed around
/// explicitly.
pub struct Harbor<R> {
    store: Store,
    status: StatusHub,
    network: NetworkMonitor,
    queue: SyncQueue,
    tracker: TimeTracker,
    engine: Arc<SyncEngine<R>>,
}

impl<R: RemoteDataService> Harbor<R> {
    /// Open a file-backed context.
    ///
    /// Failing to open the store is the only fatal startup error.
    pub async fn open(
        db_path: impl Into<PathBuf>,
        remote: R,
        settings: SyncSettings,
        online: bool,
    ) -> Result<Self> {
        let store = Store::open_path(db_path).await?;
        Self::from_store(store, remote, settings, online).await
    }

    pub async fn open_in_memory(remote: R, settings: SyncSettings, online: bool) -> Result<Self> {
        let store = Store::open_in_memory().await?;
        Self::from_store(store, remote, settings, online).await
    }

    async fn from_store(
        store: Store,
        remote: R,
        settings: SyncSettings,
        online: bool,
    ) -> Result<Self> {
        let status = StatusHub::new(SyncStatus::initial(online));
        let network = NetworkMonitor::new(online);
        let queue = SyncQueue::new(store.clone(), status.clone(), settings.clone());
        let tracker = TimeTracker::new(store.clone(), queue.clone());
        let engine = SyncEngine::new(
            queue.clone(),
            remote,
            network.clone(),
            status.clone(),
            settings,
        );

        if let Some(last_synced_at) = store.metadata().get(metadata::LAST_SYNCED_AT).await? {
            status.set_last_synced_at(last_synced_at);
        }
        let pending = queue.refresh_pending().await?;
        tracing::info!("Time Harbor ready ({pending} pending changes, online: {online})");

        Ok(Self {
            store,
            status,
            network,
            queue,
            tracker,
            engine: Arc::new(engine),
        })
    }

    pub const fn store(&self) -> &Store {
        &self.store
    }

    pub const fn status(&self) -> &StatusHub {
        &self.status
    }

    pub const fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub const fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub const fn tracker(&self) -> &TimeTracker {
        &self.tracker
    }

    /// Shared engine handle, for driving [`SyncEngine::run`] on a task
    pub fn engine(&self) -> Arc<SyncEngine<R>> {
        Arc::clone(&self.engine)
    }

    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.engine.sync_now().await
    }

    /// Report a platform connectivity change
    pub async fn set_online(&self, online: bool) {
        self.engine.handle_connectivity(online).await;
    }

    pub async fn session(&self) -> Result<Option<Session>> {
        self.store.metadata().get(metadata::SESSION).await
    }

    /// Sign in and make the first team the current one
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let auth = self
            .network
            .while_online(self.engine.remote().sign_in(email, password))
            .await??;
        let session = self.persist_auth(auth, None).await?;
        tracing::info!("Signed in as {}", session.user_id);
        Ok(session)
    }

    /// Re-validate the stored session with the backend.
    ///
    /// Offline, the locally persisted session is returned as is.
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        let local = self.session().await?;
        if !self.network.is_online() {
            return Ok(local);
        }

        match self
            .network
            .while_online(self.engine.remote().get_session())
            .await??
        {
            Some(auth) => {
                let current = local.and_then(|session| session.current_team_id);
                Ok(Some(self.persist_auth(auth, current).await?))
            }
            None => {
                self.store.metadata().remove(metadata::SESSION).await?;
                Ok(None)
            }
        }
    }

    /// Switch the current team; the user must be a member
    pub async fn select_team(&self, team_id: &TeamId) -> Result<Session> {
        let mut session = self.session().await?.ok_or(Error::NoSession)?;
        let key = Membership::key_for(&session.user_id, team_id);
        if self.store.memberships().get(&key).await?.is_none() {
            return Err(Error::NotFound(format!("membership in team {team_id}")));
        }

        session.current_team_id = Some(team_id.clone());
        self.store.metadata().set(metadata::SESSION, &session).await?;
        tracing::debug!("Current team is now {team_id}");
        Ok(session)
    }

    /// Sign out remotely when possible and always clear the local session
    pub async fn sign_out(&self) -> Result<()> {
        if self.network.is_online() {
            match self
                .network
                .while_online(self.engine.remote().sign_out())
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!("Remote sign-out failed: {error}"),
                Err(error) => tracing::warn!("Remote sign-out interrupted: {error}"),
            }
        }
        self.store.metadata().remove(metadata::SESSION).await?;
        tracing::info!("Signed out");
        Ok(())
    }

    async fn persist_auth(&self, auth: AuthSession, current: Option<TeamId>) -> Result<Session> {
        let current_team_id = current
            .filter(|team_id| {
                auth.memberships
                    .iter()
                    .any(|membership| membership.team_id == *team_id)
            })
            .or_else(|| {
                auth.memberships
                    .first()
                    .map(|membership| membership.team_id.clone())
            });
        let session = Session {
            user_id: auth.user.id.clone(),
            current_team_id,
        };

        let mut batch = self.store.batch();
        batch.put(&auth.user)?;
        for membership in &auth.memberships {
            batch.put(membership)?;
        }
        batch.set_metadata(metadata::SESSION, &session)?;
        batch.commit().await?;
        Ok(session)
    }
}
