//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result};

use vaultkeep::config::Config;
use vaultkeep::store::FileVaultStore;

pub mod clear;
pub mod migrate;
pub mod show;

/// Load the config and open the file store it points at.
async fn open_store(config_path: &str) -> Result<(Config, FileVaultStore)> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config from '{config_path}'"))?;
    let store = FileVaultStore::new(config.data_dir(Path::new(config_path)));
    Ok((config, store))
}
