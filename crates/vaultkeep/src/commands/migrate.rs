//! `vaultkeep migrate`: rewrite stored records in the current format.
//!
//! Legacy field names are read on load and only current names are written,
//! so a load/save pass upgrades every document in place.

use anyhow::{Context, Result};
use tracing::warn;

use vaultkeep::model::RecordDefaults;
use vaultkeep::store::VaultBackend;

pub async fn run(config_path: &str, dry_run: bool) -> Result<()> {
    let (config, store) = super::open_store(config_path).await?;

    let owners = store
        .list()
        .await
        .with_context(|| format!("failed to list {}", store.data_dir().display()))?;

    let mut rewritten = 0;
    let mut failed = 0;
    for owner in &owners {
        let defaults = RecordDefaults::new(owner.as_str(), config.vault.slots_per_vault);
        let record = match store.read(owner, &defaults).await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                // Malformed documents were copied aside by the read; leave them.
                warn!(owner = %owner, error = %e, "Skipping unreadable record");
                failed += 1;
                continue;
            }
        };

        if dry_run {
            println!("would rewrite {owner} ({} item(s))", record.total_items());
            rewritten += 1;
            continue;
        }

        match store.save(&record).await {
            Ok(()) => rewritten += 1,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Failed to rewrite record");
                failed += 1;
            }
        }
    }

    println!(
        "{} {rewritten} of {} record(s), {failed} failed",
        if dry_run { "Would rewrite" } else { "Rewrote" },
        owners.len()
    );

    if failed > 0 {
        anyhow::bail!("{failed} record(s) could not be migrated");
    }
    Ok(())
}
