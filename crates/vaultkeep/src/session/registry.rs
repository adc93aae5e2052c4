//! Session registry: at most one live session per owner.
//!
//! The registry is responsible for:
//! - Opening sessions, replacing any session the owner already has
//! - Closing sessions with a final, awaited save
//! - Graceful shutdown of all actors

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::access::{Identity, SharedPolicy};
use crate::cache::VaultCache;
use crate::sync::KeyedLocks;

use super::actor::SessionActor;
use super::actor_types::{ActorConfig, SessionError};
use super::handle::SessionHandle;

// ============================================================================
// Open Outcome
// ============================================================================

/// Result of asking to open a vault.
#[derive(Debug)]
pub enum OpenOutcome {
    Opened(SessionHandle),
    /// The policy refused; nothing was loaded or replaced.
    Denied { vault: u32, max_accessible: u32 },
}

impl OpenOutcome {
    pub fn handle(self) -> Option<SessionHandle> {
        match self {
            Self::Opened(handle) => Some(handle),
            Self::Denied { .. } => None,
        }
    }
}

struct ActiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

// ============================================================================
// Session Registry
// ============================================================================

/// Owner key → live session. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, ActiveSession>>,
    /// Serializes open/close for one owner.
    transitions: KeyedLocks,
    cache: VaultCache,
    policy: SharedPolicy,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionRegistry {
    pub fn new(cache: VaultCache, policy: SharedPolicy) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            sessions: Arc::new(DashMap::new()),
            transitions: KeyedLocks::new(),
            cache,
            policy,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub(crate) fn lock_table(&self) -> &KeyedLocks {
        &self.transitions
    }

    // ------------------------------------------------------------------------
    // Open / Close
    // ------------------------------------------------------------------------

    /// Open vault `vault` for `identity`.
    ///
    /// An owner's previous session is flushed and saved before the new one
    /// reads the record, so the new view always sees the old session's edits.
    pub async fn open(&self, identity: &Identity, vault: u32) -> Result<OpenOutcome, SessionError> {
        let owner = identity.owner.as_str();
        let policy = self.policy.current();

        if !policy.can_access(identity, vault) {
            let max_accessible = policy.max_accessible_vault(identity);
            debug!(owner = %owner, vault, max_accessible, "Vault access denied");
            return Ok(OpenOutcome::Denied {
                vault,
                max_accessible,
            });
        }

        let _transition = self.transitions.lock(owner).await;

        if *self.shutdown_rx.borrow() {
            return Err(SessionError::SessionClosed);
        }

        if let Err(e) = self.teardown(owner).await {
            // The old view is already in the record, marked dirty; the next
            // save picks it up.
            warn!(owner = %owner, error = %e, "Previous session did not save cleanly");
        }

        // Pinned until teardown, so the record can't be evicted under the session.
        let record = self.cache.attach(owner).await;
        let slots = policy.slots_for(identity);
        let (view, capacity) = {
            let mut record = record.lock().await;
            let page = record.page_or_create(vault, slots);
            (page.to_view(), page.capacity())
        };

        let config = ActorConfig {
            owner: owner.to_string(),
            vault,
            capacity,
            view,
            record,
            cache: self.cache.clone(),
            policy,
        };
        let (tx, task) = SessionActor::spawn(config, self.shutdown_rx.clone());
        let handle = SessionHandle::new(tx, owner.to_string(), vault, capacity);

        self.sessions.insert(
            owner.to_string(),
            ActiveSession {
                handle: handle.clone(),
                task,
            },
        );

        info!(owner = %owner, vault, capacity, "Opened vault session");
        Ok(OpenOutcome::Opened(handle))
    }

    /// Close the owner's session, if any, with an awaited final save.
    ///
    /// Returns `Ok(false)` when no session was open.
    pub async fn close(&self, owner: &str) -> Result<bool, SessionError> {
        let _transition = self.transitions.lock(owner).await;
        self.teardown(owner).await
    }

    /// Hold `owner`'s transition lock: no session opens, closes or switches
    /// for them until the guard drops.
    pub(crate) async fn lock_owner(&self, owner: &str) -> OwnedMutexGuard<()> {
        self.transitions.lock(owner).await
    }

    /// [`close`](Self::close) for a caller already holding
    /// [`lock_owner`](Self::lock_owner).
    pub(crate) async fn close_locked(
        &self,
        owner: &str,
        _transition: &OwnedMutexGuard<()>,
    ) -> Result<bool, SessionError> {
        self.teardown(owner).await
    }

    /// Close every open session. Failures are logged, not returned.
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for owner in self.owners() {
            match self.close(&owner).await {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => warn!(owner = %owner, error = %e, "Failed to close session"),
            }
        }
        closed
    }

    /// Caller holds the owner's transition lock.
    async fn teardown(&self, owner: &str) -> Result<bool, SessionError> {
        let Some((_, active)) = self.sessions.remove(owner) else {
            return Ok(false);
        };

        let result = active.handle.close().await;
        if let Err(e) = active.task.await {
            warn!(owner = %owner, error = %e, "Session actor task failed");
        }
        self.cache.detach(owner);

        match result {
            Ok(()) => {
                debug!(owner = %owner, vault = active.handle.vault(), "Closed vault session");
                Ok(true)
            }
            // Actor already stopped on its own and flushed on the way out.
            Err(SessionError::SessionClosed) => Ok(true),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn active(&self, owner: &str) -> Option<SessionHandle> {
        self.sessions.get(owner).map(|entry| entry.handle.clone())
    }

    pub fn is_open(&self, owner: &str) -> bool {
        self.sessions.contains_key(owner)
    }

    pub fn owners(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Signal every actor to drain, flush and exit, then wait for them.
    ///
    /// Later opens fail with [`SessionError::SessionClosed`].
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let owners = self.owners();
        if owners.is_empty() {
            return;
        }

        info!(count = owners.len(), "Shutting down vault sessions");

        for owner in owners {
            let _transition = self.transitions.lock(&owner).await;
            if let Some((_, active)) = self.sessions.remove(&owner) {
                if let Err(e) = active.task.await {
                    warn!(owner = %owner, error = %e, "Session actor task failed");
                }
                self.cache.detach(&owner);
            }
        }

        info!("All vault sessions closed");
    }
}
