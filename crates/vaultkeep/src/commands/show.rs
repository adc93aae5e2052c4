//! `vaultkeep show`: print an owner's stored vaults.

use anyhow::{Result, bail};

use vaultkeep::model::RecordDefaults;
use vaultkeep::store::VaultBackend;

pub async fn run(config_path: &str, owner: &str) -> Result<()> {
    let (config, store) = super::open_store(config_path).await?;
    let defaults = RecordDefaults::new(owner, config.vault.slots_per_vault);

    let Some(record) = store.read(owner, &defaults).await? else {
        bail!("no stored vault for '{owner}' in {}", store.data_dir().display());
    };

    println!(
        "{owner}: {} item(s) across {} page(s), {} slots per vault",
        record.total_items(),
        record.page_count(),
        record.default_capacity()
    );

    for page in record.pages() {
        println!();
        println!(
            "Vault {} ({}/{} slots used)",
            page.number(),
            page.item_count(),
            page.capacity()
        );
        for (slot, item) in page.items() {
            let mut line = format!("  [{slot:>3}] {} x{}", item.id(), item.quantity());
            if let Some(durability) = item.durability() {
                line.push_str(&format!(" ({}/{})", durability.current, durability.max));
            }
            if item.metadata().is_some() {
                line.push_str(" +metadata");
            }
            println!("{line}");
        }
    }

    Ok(())
}
