//! Connectivity signal

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::{Error, Result};

/// Online/offline state fed by the host platform.
///
/// Clones share the same signal.
#[derive(Clone)]
pub struct NetworkMonitor {
    online: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (online, _) = watch::channel(online);
        Self {
            online: Arc::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Report a connectivity change; repeated values are ignored
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Network is now {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Run `future` while connected.
    ///
    /// Fails with [`Error::Offline`] without polling `future` when already
    /// offline, and drops it at its next suspension point if connectivity is
    /// lost while it runs.
    pub async fn while_online<F: Future>(&self, future: F) -> Result<F::Output> {
        let mut online = self.online.subscribe();
        if !*online.borrow_and_update() {
            return Err(Error::Offline);
        }

        tokio::select! {
            biased;
            _ = online.wait_for(|online| !*online) => Err(Error::Offline),
            output = future => Ok(output),
        }
    }
}
