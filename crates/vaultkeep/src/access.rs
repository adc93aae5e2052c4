//! Access policy: which vaults an identity may open, how many slots each has
//! and which items may be stored.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::config::VaultConfig;

/// Capability granting every vault up to the configured maximum.
pub const VAULT_WILDCARD: &str = "vaultkeep.vault.*";

/// Prefix of the tiered vault capability: `vaultkeep.vault.5` grants 1..=5.
pub const VAULT_PREFIX: &str = "vaultkeep.vault.";

/// Prefix of the slot tier capability: `vaultkeep.slots.27`.
pub const SLOTS_PREFIX: &str = "vaultkeep.slots.";

// ============================================================================
// Identity
// ============================================================================

/// The caller asking for access: an owner key plus the capabilities granted
/// to it by whatever permission system sits in front of this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub owner: String,
    pub capabilities: HashSet<String>,
}

impl Identity {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            capabilities: HashSet::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn has(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

// ============================================================================
// AccessPolicy
// ============================================================================

/// Permission seam. Implementations must be cheap and side-effect free; they
/// are called on every open.
pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, identity: &Identity, vault: u32) -> bool;

    /// Slot count for pages this identity materializes.
    fn slots_for(&self, identity: &Identity) -> u32;

    /// Highest vault number the identity may open, at least 1.
    fn max_accessible_vault(&self, identity: &Identity) -> u32;

    /// Highest vault number anyone may open.
    fn max_vaults(&self) -> u32;

    fn allows_item(&self, _item_id: &str) -> bool {
        true
    }
}

// ============================================================================
// PermissionPolicy
// ============================================================================

/// Tiered capability policy built from the `vault` configuration section.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    max_vaults: u32,
    slots_per_vault: u32,
    slot_tiers: Vec<u32>,
    blacklist: HashSet<String>,
}

impl PermissionPolicy {
    pub fn new(max_vaults: u32, slots_per_vault: u32) -> Self {
        Self {
            max_vaults: max_vaults.max(1),
            slots_per_vault: slots_per_vault.max(1),
            slot_tiers: Vec::new(),
            blacklist: HashSet::new(),
        }
    }

    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(config.max_vaults, config.slots_per_vault)
            .with_slot_tiers(config.slot_tiers.iter().copied())
            .with_blacklist(config.blacklist.iter().cloned())
    }

    /// Tiers are kept sorted and deduplicated; zero is ignored.
    pub fn with_slot_tiers(mut self, tiers: impl IntoIterator<Item = u32>) -> Self {
        self.slot_tiers = tiers.into_iter().filter(|t| *t > 0).collect();
        self.slot_tiers.sort_unstable();
        self.slot_tiers.dedup();
        self
    }

    pub fn with_blacklist(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.blacklist = ids.into_iter().map(|id| id.to_ascii_lowercase()).collect();
        self
    }

    pub fn slots_per_vault(&self) -> u32 {
        self.slots_per_vault
    }

    fn grants_vault(identity: &Identity, n: u32) -> bool {
        identity.has(&format!("{VAULT_PREFIX}{n}"))
    }
}

impl AccessPolicy for PermissionPolicy {
    fn can_access(&self, identity: &Identity, vault: u32) -> bool {
        if vault == 0 || vault > self.max_vaults {
            return false;
        }
        if vault == 1 || identity.has(VAULT_WILDCARD) {
            return true;
        }
        // vault.N grants every vault below it, so any grant at or above
        // `vault` is enough.
        (vault..=self.max_vaults).any(|n| Self::grants_vault(identity, n))
    }

    fn slots_for(&self, identity: &Identity) -> u32 {
        let slots = match self.slot_tiers.first() {
            None => self.slots_per_vault,
            Some(&lowest) => self
                .slot_tiers
                .iter()
                .rev()
                .copied()
                .find(|t| identity.has(&format!("{SLOTS_PREFIX}{t}")))
                .unwrap_or(lowest),
        };
        slots.clamp(1, self.slots_per_vault)
    }

    fn max_accessible_vault(&self, identity: &Identity) -> u32 {
        if identity.has(VAULT_WILDCARD) {
            return self.max_vaults;
        }
        (2..=self.max_vaults)
            .rev()
            .find(|n| Self::grants_vault(identity, *n))
            .unwrap_or(1)
    }

    fn max_vaults(&self) -> u32 {
        self.max_vaults
    }

    fn allows_item(&self, item_id: &str) -> bool {
        !self.blacklist.contains(&item_id.to_ascii_lowercase())
    }
}

// ============================================================================
// SharedPolicy
// ============================================================================

/// Current policy, swappable at runtime on config reload.
///
/// Readers take a cheap `Arc` snapshot, so a swap never blocks an open that
/// is already in progress.
#[derive(Clone)]
pub struct SharedPolicy {
    inner: Arc<RwLock<Arc<dyn AccessPolicy>>>,
}

impl SharedPolicy {
    pub fn new(policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    pub fn current(&self) -> Arc<dyn AccessPolicy> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn replace(&self, policy: Arc<dyn AccessPolicy>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = policy;
    }
}

impl std::fmt::Debug for SharedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPolicy").finish_non_exhaustive()
    }
}
