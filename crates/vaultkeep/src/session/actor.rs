//! Session actor: owns one open page's working view.
//!
//! Every slot edit is applied to the view and, in the same step, mirrored
//! into the canonical record under its lock. Persistence is then scheduled as
//! tracked background work, so a crash loses at most the saves still queued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::access::AccessPolicy;
use crate::cache::{SharedVault, VaultCache};
use crate::model::Item;

use super::actor_types::{ActorConfig, CHANNEL_CAPACITY, SessionCommand, SessionError, SessionInfo};

// ============================================================================
// Session Actor
// ============================================================================

pub(crate) struct SessionActor {
    owner: String,
    vault: u32,
    capacity: u32,
    opened_at: DateTime<Utc>,
    mutations: u64,
    view: Vec<Option<Item>>,

    record: SharedVault,
    cache: VaultCache,
    policy: Arc<dyn AccessPolicy>,

    command_rx: mpsc::Receiver<SessionCommand>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Whether the command loop keeps going after a command.
enum Flow {
    Continue,
    Stop,
}

impl SessionActor {
    /// Spawn an actor for a freshly opened page.
    ///
    /// Returns the command sender and the task handle.
    pub(crate) fn spawn(
        config: ActorConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (mpsc::Sender<SessionCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut view = config.view;
        view.resize(config.capacity as usize, None);

        let actor = Self {
            owner: config.owner,
            vault: config.vault,
            capacity: config.capacity,
            opened_at: Utc::now(),
            mutations: 0,
            view,
            record: config.record,
            cache: config.cache,
            policy: config.policy,
            command_rx: rx,
            shutdown_rx,
        };

        let handle = tokio::spawn(actor.run());
        (tx, handle)
    }

    async fn run(mut self) {
        debug!(owner = %self.owner, vault = self.vault, "Session actor started");

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!(owner = %self.owner, vault = self.vault, "Session actor received shutdown signal");
                        if let Flow::Stop = self.drain_commands().await {
                            debug!(owner = %self.owner, vault = self.vault, "Session actor stopped");
                            return;
                        }
                        break;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            if let Flow::Stop = self.handle_command(command).await {
                                debug!(owner = %self.owner, vault = self.vault, "Session actor stopped");
                                return;
                            }
                        }
                        None => {
                            debug!(owner = %self.owner, vault = self.vault, "All handles dropped, closing session");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.flush().await {
            warn!(owner = %self.owner, vault = self.vault, error = %e, "Final session flush failed");
        }
        debug!(owner = %self.owner, vault = self.vault, "Session actor stopped");
    }

    /// Process whatever is already queued, then stop accepting commands.
    async fn drain_commands(&mut self) -> Flow {
        while let Ok(cmd) = self.command_rx.try_recv() {
            if let Flow::Stop = self.handle_command(cmd).await {
                return Flow::Stop;
            }
        }
        self.command_rx.close();
        Flow::Continue
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> Flow {
        match cmd {
            SessionCommand::SetSlot { slot, item, reply } => {
                let result = self.set_slot(slot, item).await;
                let _ = reply.send(result);
            }
            SessionCommand::GetSlot { slot, reply } => {
                let item = self.view.get(slot as usize).cloned().flatten();
                let _ = reply.send(item);
            }
            SessionCommand::Contents { reply } => {
                let _ = reply.send(self.view.clone());
            }
            SessionCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            SessionCommand::Close { reply } => {
                let result = self.flush().await;
                let _ = reply.send(result);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            owner: self.owner.clone(),
            vault: self.vault,
            capacity: self.capacity,
            opened_at: self.opened_at,
            mutations: self.mutations,
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    async fn set_slot(&mut self, slot: u32, item: Option<Item>) -> Result<bool, SessionError> {
        if slot >= self.capacity {
            return Ok(false);
        }

        let item = item.filter(|item| !item.is_absent());
        if let Some(item) = &item {
            if !self.policy.allows_item(item.id()) {
                return Err(SessionError::ItemRejected(item.id().to_string()));
            }
        }

        self.view[slot as usize] = item.clone();
        {
            let mut record = self.record.lock().await;
            record.set_item(self.vault, slot, item, self.capacity);
        }
        self.mutations += 1;

        self.cache
            .save_in_background(&self.owner, Arc::clone(&self.record));
        Ok(true)
    }

    /// Write the whole view into the record and save it, even if clean.
    async fn flush(&mut self) -> Result<(), SessionError> {
        {
            let mut record = self.record.lock().await;
            record.replace_page(self.vault, self.capacity, &self.view);
        }

        self.cache
            .persist(&self.owner, &self.record, true)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Persistence(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
