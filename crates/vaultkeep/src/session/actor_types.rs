//! Session actor protocol and error types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::access::AccessPolicy;
use crate::cache::{SharedVault, VaultCache};
use crate::model::Item;

/// Bounded queue between handles and their actor.
pub const CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Session Command
// ============================================================================

/// Commands that can be sent to a session actor.
pub enum SessionCommand {
    // Write operations
    SetSlot {
        slot: u32,
        item: Option<Item>,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },

    // Read operations
    GetSlot {
        slot: u32,
        reply: oneshot::Sender<Option<Item>>,
    },
    Contents {
        reply: oneshot::Sender<Vec<Option<Item>>>,
    },
    Info {
        reply: oneshot::Sender<SessionInfo>,
    },

    // Lifecycle
    Close {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session was closed, replaced by a newer one, or shut down.
    #[error("session is closed")]
    SessionClosed,

    /// The access policy refuses to store this item.
    #[error("item may not be stored in a vault: {0}")]
    ItemRejected(String),

    /// The final save on close failed. The edits stay in memory, marked dirty.
    #[error("persistence error: {0}")]
    Persistence(String),
}

// ============================================================================
// Info
// ============================================================================

/// Snapshot of a session's state, for display and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub owner: String,
    pub vault: u32,
    pub capacity: u32,
    pub opened_at: DateTime<Utc>,
    /// Slot edits applied since the session opened.
    pub mutations: u64,
}

// ============================================================================
// Actor Config
// ============================================================================

/// Everything an actor needs at spawn time.
pub(crate) struct ActorConfig {
    pub owner: String,
    pub vault: u32,
    pub capacity: u32,
    /// Page contents at open time, one entry per slot.
    pub view: Vec<Option<Item>>,
    pub record: SharedVault,
    pub cache: VaultCache,
    pub policy: Arc<dyn AccessPolicy>,
}
