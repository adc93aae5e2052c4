//! In-memory vault cache.
//!
//! Holds at most one live [`VaultRecord`] per owner key:
//! - concurrent `get`s for an absent key share a single backend load
//! - saves snapshot under the record lock and write outside it
//! - `dirty` is cleared only for the revision that actually reached storage
//! - a record with a session attached is never evicted

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::background::BackgroundTasks;
use crate::model::VaultRecord;
use crate::store::{StorageResult, VaultBackend};
use crate::sync::KeyedLocks;

/// A resident record. Every holder sees the same instance.
pub type SharedVault = Arc<Mutex<VaultRecord>>;

struct Resident {
    vault: SharedVault,
    /// Sessions bound to this instance.
    sessions: usize,
}

/// Maximum concurrent backend writes during `save_all`.
const SAVE_ALL_CONCURRENCY: usize = 16;

/// How often `unload` re-saves a record that was dirtied mid-save before it
/// gives up and leaves it for the next sweep.
const UNLOAD_ATTEMPTS: usize = 3;

// ============================================================================
// SaveAllReport
// ============================================================================

/// Outcome of a full sweep.
#[derive(Debug, Default)]
pub struct SaveAllReport {
    /// Records written.
    pub saved: usize,
    /// Records skipped because they were already clean.
    pub clean: usize,
    /// Records that failed to save (owner, error message). They stay dirty.
    pub failed: Vec<(String, String)>,
}

impl SaveAllReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// VaultCache
// ============================================================================

/// Owner key → resident record, backed by a [`VaultBackend`].
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct VaultCache {
    records: Arc<DashMap<String, Resident>>,
    /// Serializes load and evict for one key.
    inflight: KeyedLocks,
    /// Serializes writes for one key.
    save_locks: KeyedLocks,
    backend: Arc<dyn VaultBackend>,
    default_capacity: Arc<AtomicU32>,
    background: BackgroundTasks,
}

impl VaultCache {
    pub fn new(
        backend: Arc<dyn VaultBackend>,
        default_capacity: u32,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            inflight: KeyedLocks::new(),
            save_locks: KeyedLocks::new(),
            backend,
            default_capacity: Arc::new(AtomicU32::new(default_capacity.max(1))),
            background,
        }
    }

    pub fn backend(&self) -> &Arc<dyn VaultBackend> {
        &self.backend
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Capacity used for records and pages that don't state their own.
    pub fn default_capacity(&self) -> u32 {
        self.default_capacity.load(Ordering::Relaxed)
    }

    /// Applies to loads that start after this call.
    pub fn set_default_capacity(&self, capacity: u32) {
        self.default_capacity.store(capacity.max(1), Ordering::Relaxed);
    }

    /// Per-key locks this cache owns, for periodic stale-entry cleanup.
    pub(crate) fn lock_tables(&self) -> [&KeyedLocks; 2] {
        [&self.inflight, &self.save_locks]
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Get the resident record for `owner`, loading it on first use.
    ///
    /// Never fails: anything the backend can't produce becomes a fresh record.
    /// Concurrent callers for the same absent key perform one load and all
    /// receive the same instance.
    pub async fn get(&self, owner: &str) -> SharedVault {
        if let Some(vault) = self.get_cached(owner) {
            return vault;
        }

        let _loading = self.inflight.lock(owner).await;

        // Another caller may have finished the load while we waited.
        if let Some(vault) = self.get_cached(owner) {
            return vault;
        }

        let record = self.backend.load(owner, self.default_capacity()).await;
        let vault: SharedVault = Arc::new(Mutex::new(record));
        self.records.insert(
            owner.to_string(),
            Resident {
                vault: Arc::clone(&vault),
                sessions: 0,
            },
        );
        vault
    }

    pub fn get_cached(&self, owner: &str) -> Option<SharedVault> {
        self.records.get(owner).map(|entry| Arc::clone(&entry.vault))
    }

    /// Get the record for `owner` and bind a session to it.
    ///
    /// The instance stays resident until the matching
    /// [`detach`](Self::detach), so every later `get` returns the record the
    /// session mirrors into.
    pub async fn attach(&self, owner: &str) -> SharedVault {
        loop {
            let vault = self.get(owner).await;
            if let Some(mut entry) = self.records.get_mut(owner) {
                if Arc::ptr_eq(&entry.vault, &vault) {
                    entry.sessions += 1;
                    return vault;
                }
            }
            // Evicted between the load and the bind.
            debug!(owner = %owner, "Vault record evicted while attaching, reloading");
        }
    }

    /// Release a binding taken with [`attach`](Self::attach).
    pub fn detach(&self, owner: &str) {
        if let Some(mut entry) = self.records.get_mut(owner) {
            entry.sessions = entry.sessions.saturating_sub(1);
        }
    }

    /// Whether a session is bound to the resident record.
    pub fn is_attached(&self, owner: &str) -> bool {
        self.records
            .get(owner)
            .is_some_and(|entry| entry.sessions > 0)
    }

    pub fn is_cached(&self, owner: &str) -> bool {
        self.records.contains_key(owner)
    }

    pub fn owners(&self) -> Vec<String> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Save a resident record if it is dirty.
    ///
    /// Returns `Ok(false)` without touching storage when the owner isn't
    /// resident or the record is clean. A failed write leaves it dirty.
    pub async fn save(&self, owner: &str) -> StorageResult<bool> {
        match self.get_cached(owner) {
            Some(vault) => self.persist(owner, &vault, false).await,
            None => Ok(false),
        }
    }

    /// Save a resident record even if it is clean.
    pub async fn force_save(&self, owner: &str) -> StorageResult<bool> {
        match self.get_cached(owner) {
            Some(vault) => self.persist(owner, &vault, true).await,
            None => Ok(false),
        }
    }

    /// Write `vault`, whether or not it is still resident.
    ///
    /// Sessions hold their own reference; this keeps their final flush
    /// durable even if the owner was evicted concurrently.
    pub async fn persist(&self, owner: &str, vault: &SharedVault, force: bool) -> StorageResult<bool> {
        let _saving = self.save_locks.lock(owner).await;

        let snapshot = {
            let record = vault.lock().await;
            if !force && !record.is_dirty() {
                return Ok(false);
            }
            record.clone()
        };

        self.backend.save(&snapshot).await?;

        let clean = vault.lock().await.mark_clean(snapshot.revision());
        debug!(
            owner = %owner,
            revision = snapshot.revision(),
            clean,
            "Saved vault record"
        );
        Ok(true)
    }

    /// Schedule a save of `vault` as tracked background work.
    ///
    /// Failures are logged; the record stays dirty for the next attempt.
    pub fn save_in_background(&self, owner: &str, vault: SharedVault) {
        let cache = self.clone();
        let owner = owner.to_string();
        self.background.spawn(async move {
            if let Err(e) = cache.persist(&owner, &vault, false).await {
                warn!(owner = %owner, error = %e, "Background vault save failed");
            }
        });
    }

    /// Save every resident dirty record.
    ///
    /// One failing record never stops the sweep; failures are collected.
    pub async fn save_all(&self) -> SaveAllReport {
        // Collect first so no DashMap guard is held across an await.
        let resident: Vec<(String, SharedVault)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.vault)))
            .collect();

        let results: Vec<_> = stream::iter(resident)
            .map(|(owner, vault)| async move {
                let result = self.persist(&owner, &vault, false).await;
                (owner, result)
            })
            .buffer_unordered(SAVE_ALL_CONCURRENCY)
            .collect()
            .await;

        let mut report = SaveAllReport::default();
        for (owner, result) in results {
            match result {
                Ok(true) => report.saved += 1,
                Ok(false) => report.clean += 1,
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Failed to save vault record");
                    report.failed.push((owner, e.to_string()));
                }
            }
        }

        if report.saved > 0 || !report.failed.is_empty() {
            info!(
                saved = report.saved,
                clean = report.clean,
                failed = report.failed.len(),
                "Saved resident vaults"
            );
        }
        report
    }

    // ------------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------------

    /// Save `owner` if dirty, then drop it from memory.
    ///
    /// The record is evicted only if it is clean and has no session attached
    /// at removal time. If it keeps getting dirtied it stays resident and the
    /// next sweep saves it. Returns whether it was evicted; a failed save is
    /// returned and keeps it resident.
    pub async fn unload(&self, owner: &str) -> StorageResult<bool> {
        let _loading = self.inflight.lock(owner).await;

        for _ in 0..UNLOAD_ATTEMPTS {
            let Some(vault) = self.get_cached(owner) else {
                return Ok(false);
            };

            self.persist(owner, &vault, false).await?;

            let record = vault.lock().await;
            if record.is_dirty() {
                continue;
            }
            // Checked under the map entry lock, so an attach either lands
            // before the removal and blocks it or misses and reloads.
            let removed = self.records.remove_if(owner, |_, resident| {
                resident.sessions == 0 && Arc::ptr_eq(&resident.vault, &vault)
            });
            if removed.is_some() {
                debug!(owner = %owner, "Unloaded vault record");
                return Ok(true);
            }
            debug!(owner = %owner, "Vault record has a live session, left resident");
            return Ok(false);
        }

        debug!(owner = %owner, "Vault record still dirty, left resident");
        Ok(false)
    }
}

impl std::fmt::Debug for VaultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCache")
            .field("resident", &self.records.len())
            .field("default_capacity", &self.default_capacity())
            .finish_non_exhaustive()
    }
}
