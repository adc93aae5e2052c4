//! Live vault sessions.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐        ┌───────────────┐
//!  │ SessionRegistry │──owns──▶ SessionActor  │  (one per owner, runs in a tokio task)
//!  │ (owner → Handle)│        │  owns the     │
//!  └────────┬────────┘        │  page view    │
//!           │                 └───┬───────▲───┘
//!           │ clone               │       │ mpsc commands
//!           ▼                     │       │
//!  ┌─────────────────┐            │   ┌───┴─────────────┐
//!  │  SessionHandle  │────────────┼───▶ set/get/close   │
//!  └─────────────────┘            │   └─────────────────┘
//!                                 ▼
//!                      ┌─────────────────────┐
//!                      │ VaultCache record   │  mirrored under its lock,
//!                      │ (Arc<Mutex<...>>)   │  saved in the background
//!                      └─────────────────────┘
//! ```
//!
//! - **SessionActor**: owns the open page's working view; applies edits
//!   sequentially and mirrors each into the canonical record.
//! - **SessionHandle**: cloneable sender; stale handles fail with
//!   `SessionClosed` once their session is closed or replaced.
//! - **SessionRegistry**: one session per owner; opening a second vault
//!   tears down the first with an awaited save.

mod actor;
mod actor_types;
mod handle;
mod registry;

pub use actor_types::{CHANNEL_CAPACITY, SessionError, SessionInfo};
pub use handle::SessionHandle;
pub use registry::{OpenOutcome, SessionRegistry};
