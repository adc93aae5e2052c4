//! Vault service: the cache, the session registry and their background work,
//! created at startup and shut down explicitly.

use std::path::Path;
// std::sync::Mutex: never held across an .await.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::access::{AccessPolicy, Identity, PermissionPolicy, SharedPolicy};
use crate::background::BackgroundTasks;
use crate::cache::{SaveAllReport, VaultCache};
use crate::config::Config;
use crate::model::Item;
use crate::session::{OpenOutcome, SessionError, SessionHandle, SessionRegistry};
use crate::store::{FileVaultStore, StorageResult, VaultBackend};

// ============================================================================
// Stats
// ============================================================================

/// Per-owner usage summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStats {
    /// Pages holding at least one item.
    pub pages_used: usize,
    pub items_stored: usize,
    pub accessible_vaults: u32,
    /// Slots across every accessible vault at the identity's slot tier.
    pub total_slots: u64,
}

struct ServiceState {
    autosave: Option<JoinHandle<()>>,
    maintenance: Vec<JoinHandle<()>>,
    shutdown_grace: Duration,
}

// ============================================================================
// VaultService
// ============================================================================

/// Entry point for embedding applications. Cheap to clone.
#[derive(Clone)]
pub struct VaultService {
    cache: VaultCache,
    sessions: SessionRegistry,
    policy: SharedPolicy,
    background: BackgroundTasks,
    state: Arc<Mutex<ServiceState>>,
}

impl VaultService {
    /// Build a service over the file store the config points at.
    ///
    /// `config_path` anchors a relative `storage.directory`.
    pub async fn from_config(config: &Config, config_path: &Path) -> Self {
        let backend = Arc::new(FileVaultStore::new(config.data_dir(config_path)));
        Self::start(backend, config).await
    }

    /// Initialize the backend and start autosave and lock cleanup.
    ///
    /// A backend that fails to initialize is logged; later saves report
    /// their own errors.
    pub async fn start(backend: Arc<dyn VaultBackend>, config: &Config) -> Self {
        if let Err(e) = backend.initialize().await {
            warn!(error = %e, "Failed to initialize vault storage");
        }

        let background = BackgroundTasks::new();
        let policy = SharedPolicy::new(Arc::new(PermissionPolicy::from_config(&config.vault)));
        let cache = VaultCache::new(backend, config.vault.slots_per_vault, background.clone());
        let sessions = SessionRegistry::new(cache.clone(), policy.clone());

        let mut maintenance: Vec<JoinHandle<()>> = cache
            .lock_tables()
            .into_iter()
            .map(|locks| locks.spawn_cleanup("vault"))
            .collect();
        maintenance.push(sessions.lock_table().spawn_cleanup("session"));

        let service = Self {
            cache,
            sessions,
            policy,
            background,
            state: Arc::new(Mutex::new(ServiceState {
                autosave: None,
                maintenance,
                shutdown_grace: config.storage.shutdown_grace(),
            })),
        };
        service.restart_autosave(config.storage.save_interval());

        info!(
            max_vaults = config.vault.max_vaults,
            slots_per_vault = config.vault.slots_per_vault,
            "Vault service started"
        );
        service
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cache(&self) -> &VaultCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn policy(&self) -> Arc<dyn AccessPolicy> {
        self.policy.current()
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    pub async fn open_vault(
        &self,
        identity: &Identity,
        vault: u32,
    ) -> Result<OpenOutcome, SessionError> {
        self.sessions.open(identity, vault).await
    }

    pub async fn close_vault(&self, owner: &str) -> Result<bool, SessionError> {
        self.sessions.close(owner).await
    }

    pub fn active_session(&self, owner: &str) -> Option<SessionHandle> {
        self.sessions.active(owner)
    }

    /// Session showing `vault` for `owner`, if that's what is open.
    fn session_on(&self, owner: &str, vault: u32) -> Option<SessionHandle> {
        self.sessions
            .active(owner)
            .filter(|handle| handle.vault() == vault)
    }

    // ------------------------------------------------------------------------
    // Owner lifecycle
    // ------------------------------------------------------------------------

    /// Warm the cache for an owner who just connected. Returns immediately.
    pub fn owner_connected(&self, owner: &str) {
        let cache = self.cache.clone();
        let owner = owner.to_string();
        self.background.spawn(async move {
            cache.get(&owner).await;
            debug!(owner = %owner, "Prefetched vault record");
        });
    }

    /// Close the owner's session, then save and evict their record.
    /// Returns immediately.
    ///
    /// Both steps run under the owner's transition lock, so a reconnect that
    /// opens a vault waits and then binds to a resident record.
    pub fn owner_disconnected(&self, owner: &str) {
        let service = self.clone();
        let owner = owner.to_string();
        self.background.spawn(async move {
            let transition = service.sessions.lock_owner(&owner).await;
            if let Err(e) = service.sessions.close_locked(&owner, &transition).await {
                warn!(owner = %owner, error = %e, "Failed to close session on disconnect");
            }
            match service.cache.unload(&owner).await {
                Ok(true) => debug!(owner = %owner, "Unloaded vault on disconnect"),
                Ok(false) => {}
                Err(e) => warn!(owner = %owner, error = %e, "Failed to save vault on disconnect"),
            }
        });
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    /// Read one slot. An open session on that vault is authoritative.
    pub async fn get_item(&self, owner: &str, vault: u32, slot: u32) -> Option<Item> {
        if let Some(handle) = self.session_on(owner, vault) {
            if let Ok(item) = handle.get_slot(slot).await {
                return item;
            }
        }

        let record = self.cache.get(owner).await;
        let record = record.lock().await;
        record.get_item(vault, slot).cloned()
    }

    /// Write one slot without opening a session.
    ///
    /// Returns `Ok(false)` for a vault number outside `1..=max_vaults` or a
    /// slot outside the page. Routed through the owner's session when it
    /// shows the same vault, so the session's final flush can't overwrite
    /// the edit; the owner's transition lock keeps a session from opening
    /// in between.
    pub async fn set_item(
        &self,
        owner: &str,
        vault: u32,
        slot: u32,
        item: Option<Item>,
    ) -> Result<bool, SessionError> {
        let policy = self.policy.current();
        if vault == 0 || vault > policy.max_vaults() {
            debug!(owner = %owner, vault, "Ignoring edit to a vault outside the configured range");
            return Ok(false);
        }

        let _transition = self.sessions.lock_owner(owner).await;
        if let Some(handle) = self.session_on(owner, vault) {
            match handle.set_slot(slot, item.clone()).await {
                Err(SessionError::SessionClosed) => {}
                result => return result,
            }
        }

        let item = item.filter(|item| !item.is_absent());
        if let Some(item) = &item {
            if !policy.allows_item(item.id()) {
                return Err(SessionError::ItemRejected(item.id().to_string()));
            }
        }

        let vault_record = self.cache.get(owner).await;
        let applied = {
            let mut record = vault_record.lock().await;
            let capacity = record.default_capacity();
            record.set_item(vault, slot, item, capacity)
        };
        if applied {
            self.cache.save_in_background(owner, vault_record);
        }
        Ok(applied)
    }

    pub async fn total_items(&self, owner: &str) -> usize {
        let record = self.cache.get(owner).await;
        let record = record.lock().await;
        record.total_items()
    }

    pub async fn stats(&self, identity: &Identity) -> VaultStats {
        let policy = self.policy.current();
        let accessible_vaults = policy.max_accessible_vault(identity);
        let slots = policy.slots_for(identity);

        let record = self.cache.get(&identity.owner).await;
        let record = record.lock().await;
        VaultStats {
            pages_used: record.pages().filter(|page| !page.is_empty()).count(),
            items_stored: record.total_items(),
            accessible_vaults,
            total_slots: u64::from(accessible_vaults) * u64::from(slots),
        }
    }

    // ------------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------------

    /// Empty every page of `owner` and save, closing their session first.
    pub async fn clear_all(&self, owner: &str) -> StorageResult<()> {
        let transition = self.sessions.lock_owner(owner).await;
        if let Err(e) = self.sessions.close_locked(owner, &transition).await {
            warn!(owner = %owner, error = %e, "Session did not save cleanly before clear");
        }

        let vault = self.cache.get(owner).await;
        vault.lock().await.clear_all();
        self.cache.persist(owner, &vault, false).await?;

        info!(owner = %owner, "Cleared all vaults");
        Ok(())
    }

    /// Save one owner's record now if it is dirty.
    pub async fn save_vault(&self, owner: &str) -> StorageResult<bool> {
        self.cache.save(owner).await
    }

    /// Apply a new configuration: policy, default capacity, grace period and
    /// autosave interval. Open sessions keep the capacity they opened with.
    pub fn reload(&self, config: &Config) {
        self.policy
            .replace(Arc::new(PermissionPolicy::from_config(&config.vault)));
        self.cache.set_default_capacity(config.vault.slots_per_vault);
        self.state().shutdown_grace = config.storage.shutdown_grace();
        self.restart_autosave(config.storage.save_interval());

        info!(
            max_vaults = config.vault.max_vaults,
            slots_per_vault = config.vault.slots_per_vault,
            "Vault configuration reloaded"
        );
    }

    // ------------------------------------------------------------------------
    // Autosave
    // ------------------------------------------------------------------------

    /// Replace the autosave loop. `None` disables it.
    fn restart_autosave(&self, interval: Option<Duration>) {
        let mut state = self.state();
        if let Some(task) = state.autosave.take() {
            task.abort();
        }

        let Some(interval) = interval else {
            info!("Periodic autosave disabled");
            return;
        };

        let cache = self.cache.clone();
        state.autosave = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; nothing is dirty yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = cache.save_all().await;
                debug!(saved = report.saved, failed = report.failed.len(), "Autosave sweep finished");
            }
        }));
        info!(interval_secs = interval.as_secs(), "Periodic autosave started");
    }

    pub fn autosave_running(&self) -> bool {
        self.state()
            .autosave
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Save everything resident now.
    pub async fn save_all(&self) -> SaveAllReport {
        self.cache.save_all().await
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Stop autosave, close sessions with their final saves, save everything
    /// still dirty, wait for background saves, then release the backend.
    pub async fn shutdown(&self) -> SaveAllReport {
        info!("Vault service shutting down");

        let grace = {
            let mut state = self.state();
            if let Some(task) = state.autosave.take() {
                task.abort();
            }
            for task in state.maintenance.drain(..) {
                task.abort();
            }
            state.shutdown_grace
        };

        self.sessions.shutdown().await;
        let report = self.cache.save_all().await;

        if !self.background.shutdown(grace).await {
            warn!("Some background saves were abandoned");
        }

        self.cache.backend().shutdown().await;
        info!(
            saved = report.saved,
            failed = report.failed.len(),
            "Vault service stopped"
        );
        report
    }
}
