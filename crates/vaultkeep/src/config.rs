use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vaultkeep.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load and validate a config file. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path.as_ref()).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        // An empty document deserializes to nothing rather than an empty map.
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_saphyr::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.max_vaults == 0 {
            return Err(ConfigError::Invalid("vault.max_vaults must be at least 1".into()));
        }
        if self.vault.slots_per_vault == 0 {
            return Err(ConfigError::Invalid(
                "vault.slots_per_vault must be at least 1".into(),
            ));
        }
        if self.vault.slot_tiers.contains(&0) {
            return Err(ConfigError::Invalid("vault.slot_tiers must be positive".into()));
        }
        Ok(())
    }

    /// Data directory, resolved against the config file's location.
    pub fn data_dir(&self, config_path: &Path) -> PathBuf {
        resolve_path(config_path, &self.storage.directory)
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is, so behavior doesn't depend on the
/// current working directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// VaultConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_max_vaults", alias = "max_pages")]
    pub max_vaults: u32,
    #[serde(default = "default_slots_per_vault", alias = "slots_per_page")]
    pub slots_per_vault: u32,
    /// Slot counts granted by `vaultkeep.slots.<n>`; empty means every page
    /// gets `slots_per_vault`.
    #[serde(default)]
    pub slot_tiers: Vec<u32>,
    /// Item ids that may never be stored (case-insensitive).
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_vaults: default_max_vaults(),
            slots_per_vault: default_slots_per_vault(),
            slot_tiers: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

// ============================================================================
// StorageConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Zero or negative disables periodic autosave.
    #[serde(default = "default_save_interval")]
    pub save_interval_seconds: i64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl StorageConfig {
    pub fn save_interval(&self) -> Option<Duration> {
        u64::try_from(self.save_interval_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            save_interval_seconds: default_save_interval(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_max_vaults() -> u32 {
    9
}

fn default_slots_per_vault() -> u32 {
    54
}

fn default_directory() -> PathBuf {
    PathBuf::from("playerdata")
}

fn default_save_interval() -> i64 {
    300
}

fn default_shutdown_grace() -> u64 {
    10
}

// ============================================================================
// Environment expansion
// ============================================================================

/// Expand environment references before parsing.
///
/// ```yaml
/// directory: ${VAULT_DIR}               # required
/// save_interval_seconds: ${SAVE:-300}   # with default
/// note: $$HOME                          # literal "$HOME"
/// ```
///
/// A `$` not followed by `$` or `{` is kept as-is.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body.find('}').ok_or(ConfigError::UnclosedVarReference)?;
            out.push_str(&lookup_var(&body[..end])?);
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = after;
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Resolve `NAME` or `NAME:-default`.
fn lookup_var(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
