//! Durable per-owner vault storage.
//!
//! Each owner key holds numbered pages of item slots. Records are loaded on
//! demand into a [`cache::VaultCache`], edited through at most one live
//! [`session::SessionHandle`] per owner, and written back through a
//! [`store::VaultBackend`]. [`service::VaultService`] ties these together with
//! autosave and an ordered shutdown.

pub mod access;
pub mod background;
pub mod cache;
pub mod config;
pub mod model;
pub mod service;
pub mod session;
pub mod store;
pub mod sync;

pub use access::{AccessPolicy, Identity, PermissionPolicy, SharedPolicy};
pub use cache::{SaveAllReport, SharedVault, VaultCache};
pub use config::{Config, ConfigError};
pub use model::{Item, VaultPage, VaultRecord};
pub use service::{VaultService, VaultStats};
pub use session::{OpenOutcome, SessionError, SessionHandle, SessionInfo, SessionRegistry};
pub use store::{FileVaultStore, StorageError, StorageResult, VaultBackend};
