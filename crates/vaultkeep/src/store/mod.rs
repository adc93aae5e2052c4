//! Vault persistence.
//!
//! [`VaultBackend`] is the seam between the in-memory cache and durable
//! storage; [`file::FileVaultStore`] is the bundled implementation.

mod error;
pub mod file;
mod vault;

pub use error::{StorageError, StorageResult};
pub use file::FileVaultStore;
pub use vault::VaultBackend;
