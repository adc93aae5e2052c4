//! Vault persistence trait.
//!
//! Defines the contract every storage backend implements. One owner key maps
//! to one storage unit and every save rewrites the whole record.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::{RecordDefaults, VaultRecord};

use super::error::StorageResult;

/// Storage interface for vault records.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Prepare the storage location. Safe to call more than once.
    async fn initialize(&self) -> StorageResult<()>;

    /// Release backend resources.
    ///
    /// Callers await their own in-flight saves before calling this.
    async fn shutdown(&self) {}

    // ========================================================================
    // Records
    // ========================================================================

    /// Read the stored record for `owner`.
    ///
    /// Returns `Ok(None)` if nothing is stored yet.
    async fn read(&self, owner: &str, defaults: &RecordDefaults)
    -> StorageResult<Option<VaultRecord>>;

    /// Load the record for `owner`, never failing.
    ///
    /// Missing, unreadable and malformed records all resolve to a fresh empty
    /// record; the outcomes differ only in what gets logged.
    async fn load(&self, owner: &str, default_capacity: u32) -> VaultRecord {
        let defaults = RecordDefaults::new(owner, default_capacity);
        match self.read(owner, &defaults).await {
            Ok(Some(record)) => {
                debug!(owner = %owner, pages = record.page_count(), "Loaded vault record");
                record
            }
            Ok(None) => {
                debug!(owner = %owner, "No stored vault record, starting fresh");
                VaultRecord::fresh(&defaults)
            }
            Err(e) if e.is_malformed() => {
                warn!(owner = %owner, error = %e, "Stored vault record is malformed, starting fresh");
                VaultRecord::fresh(&defaults)
            }
            Err(e) => {
                warn!(owner = %owner, error = %e, "Failed to read vault record, starting fresh");
                VaultRecord::fresh(&defaults)
            }
        }
    }

    /// Persist the full record, replacing whatever was stored.
    ///
    /// Must be atomic: either the new record is stored or the old one remains.
    async fn save(&self, record: &VaultRecord) -> StorageResult<()>;

    /// Delete the stored record. Deleting a missing record is not an error.
    async fn delete(&self, owner: &str) -> StorageResult<()>;

    /// Check whether a record is stored for `owner`.
    async fn exists(&self, owner: &str) -> StorageResult<bool>;

    /// List every owner key that has a stored record.
    async fn list(&self) -> StorageResult<Vec<String>>;
}
