//! `vaultkeep clear`: empty every page of an owner's vault.

use std::path::Path;

use anyhow::{Context, Result};

use vaultkeep::config::Config;
use vaultkeep::service::VaultService;

pub async fn run(config_path: &str, owner: &str) -> Result<()> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config from '{config_path}'"))?;

    let service = VaultService::from_config(&config, Path::new(config_path)).await;
    let cleared = service.clear_all(owner).await;
    let report = service.shutdown().await;

    cleared.with_context(|| format!("failed to save cleared vault for '{owner}'"))?;
    if !report.is_ok() {
        anyhow::bail!("{} record(s) failed to save", report.failed.len());
    }

    println!("Cleared all vaults for {owner}");
    Ok(())
}
