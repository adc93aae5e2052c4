//! Handle for talking to a session actor.
//!
//! `SessionHandle` wraps an `mpsc::Sender<SessionCommand>` and is cheap to
//! clone. Once its session is closed or replaced, every call fails with
//! [`SessionError::SessionClosed`].

use tokio::sync::{mpsc, oneshot};

use crate::model::Item;

use super::actor_types::{SessionCommand, SessionError, SessionInfo};

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    owner: String,
    vault: u32,
    capacity: u32,
}

impl SessionHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SessionCommand>,
        owner: String,
        vault: u32,
        capacity: u32,
    ) -> Self {
        Self {
            tx,
            owner,
            vault,
            capacity,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The open vault number.
    pub fn vault(&self) -> u32 {
        self.vault
    }

    /// Number of slots in the open page.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// True once the actor behind this handle has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a command and wait for its reply.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        reply_rx.await.map_err(|_| SessionError::SessionClosed)
    }

    // ------------------------------------------------------------------------
    // Write Operations
    // ------------------------------------------------------------------------

    /// Put `item` in `slot`, or empty the slot with `None`.
    ///
    /// Returns `Ok(false)` if the slot is outside the page. The edit is in
    /// the record as soon as this returns; its save runs in the background.
    pub async fn set_slot(&self, slot: u32, item: Option<Item>) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::SetSlot { slot, item, reply })
            .await?
    }

    pub async fn clear_slot(&self, slot: u32) -> Result<bool, SessionError> {
        self.set_slot(slot, None).await
    }

    // ------------------------------------------------------------------------
    // Read Operations
    // ------------------------------------------------------------------------

    pub async fn get_slot(&self, slot: u32) -> Result<Option<Item>, SessionError> {
        self.request(|reply| SessionCommand::GetSlot { slot, reply })
            .await
    }

    /// The whole page, one entry per slot.
    pub async fn contents(&self) -> Result<Vec<Option<Item>>, SessionError> {
        self.request(|reply| SessionCommand::Contents { reply }).await
    }

    pub async fn info(&self) -> Result<SessionInfo, SessionError> {
        self.request(|reply| SessionCommand::Info { reply }).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Flush and stop the actor. Callers go through the registry so the
    /// owner's slot is released too.
    pub(crate) async fn close(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Close { reply })
            .await?
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("owner", &self.owner)
            .field("vault", &self.vault)
            .field("capacity", &self.capacity)
            .finish()
    }
}
