//! JSON document format for persisted vault records.
//!
//! Current field names are written; both current and legacy names are read.
//! When a document carries both generations of a field, the current name wins.
//!
//! | current         | legacy          |
//! |-----------------|-----------------|
//! | `owner`         | `playerUuid`    |
//! | `slotsPerVault` | `slotsPerPage`  |
//! | `vaults`        | `pages`         |
//! | `vaultNumber`   | `pageNumber`    |
//!
//! Unknown keys are ignored, which also covers the unlock counters
//! (`unlockedVaults`, `unlockedPages`) older documents carry.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::item::Item;
use super::page::VaultPage;
use super::record::{RecordDefaults, VaultRecord};

// ============================================================================
// Written shape
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordOut<'a> {
    owner: &'a str,
    slots_per_vault: u32,
    vaults: Vec<PageOut<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageOut<'a> {
    vault_number: u32,
    slots: u32,
    items: Vec<ItemOut<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemOut<'a> {
    slot: u32,
    item_id: &'a str,
    quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    durability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_durability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a str>,
}

// ============================================================================
// Read shape (every field optional, both name generations)
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RecordIn {
    owner: Option<String>,
    player_uuid: Option<String>,
    slots_per_vault: Option<i64>,
    slots_per_page: Option<i64>,
    vaults: Option<Vec<PageIn>>,
    pages: Option<Vec<PageIn>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PageIn {
    vault_number: Option<i64>,
    page_number: Option<i64>,
    slots: Option<i64>,
    items: Vec<ItemIn>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ItemIn {
    slot: Option<i64>,
    item_id: Option<String>,
    quantity: Option<i64>,
    durability: Option<f64>,
    max_durability: Option<f64>,
    metadata: Option<serde_json::Value>,
}

// ============================================================================
// Encode / decode
// ============================================================================

/// Encode a record as pretty-printed JSON.
///
/// Only non-empty pages and occupied slots are written, so the document size
/// tracks the contents rather than the configured capacity.
pub fn serialize(record: &VaultRecord) -> Result<Vec<u8>, serde_json::Error> {
    let vaults = record
        .pages()
        .filter(|page| !page.is_empty())
        .map(|page| PageOut {
            vault_number: page.number(),
            slots: page.capacity(),
            items: page
                .items()
                .map(|(slot, item)| ItemOut {
                    slot,
                    item_id: item.id(),
                    quantity: item.quantity(),
                    durability: item.durability().map(|d| d.current),
                    max_durability: item.durability().map(|d| d.max),
                    metadata: item.metadata(),
                })
                .collect(),
        })
        .collect();

    let doc = RecordOut {
        owner: record.owner(),
        slots_per_vault: record.default_capacity(),
        vaults,
    };

    serde_json::to_vec_pretty(&doc)
}

/// Decode a record, falling back to `defaults` for anything the document
/// doesn't say.
///
/// Empty input or a JSON `null` decodes to a fresh record with no pages.
/// Malformed JSON is an error; the caller decides how to degrade.
pub fn deserialize(bytes: &[u8], defaults: &RecordDefaults) -> Result<VaultRecord, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(VaultRecord::fresh(defaults));
    }

    let Some(doc) = serde_json::from_slice::<Option<RecordIn>>(bytes)? else {
        return Ok(VaultRecord::fresh(defaults));
    };

    let stored_owner = doc.owner.as_deref().or(doc.player_uuid.as_deref());
    if let Some(stored_owner) = stored_owner.filter(|o| *o != defaults.owner) {
        debug!(
            owner = %defaults.owner,
            stored_owner = %stored_owner,
            "Document owner differs from storage key, using storage key"
        );
    }

    let stored_capacity = doc
        .slots_per_vault
        .or(doc.slots_per_page)
        .and_then(positive);
    let record_capacity = stored_capacity.unwrap_or(defaults.capacity);

    let mut record = VaultRecord::new(defaults.owner.clone(), record_capacity);
    for page in doc.vaults.or(doc.pages).unwrap_or_default() {
        if let Some(page) = decode_page(page, record_capacity, &defaults.owner) {
            record.restore_page(page);
        }
    }

    Ok(record)
}

fn decode_page(raw: PageIn, fallback_capacity: u32, owner: &str) -> Option<VaultPage> {
    let Some(number) = raw.vault_number.or(raw.page_number).and_then(positive) else {
        warn!(owner = %owner, "Skipping stored vault without a usable number");
        return None;
    };
    let capacity = match raw.slots {
        Some(slots) => positive(slots),
        None => positive(i64::from(fallback_capacity)),
    };
    let Some(capacity) = capacity else {
        warn!(owner = %owner, vault = number, "Skipping stored vault without a usable capacity");
        return None;
    };

    let mut page = VaultPage::new(number, capacity);
    for raw_item in raw.items {
        let Some(slot) = raw_item.slot.and_then(|s| u32::try_from(s).ok()) else {
            continue;
        };
        let Some(item) = decode_item(raw_item) else {
            continue;
        };
        if !page.set(slot, Some(item)) {
            warn!(
                owner = %owner,
                vault = number,
                slot,
                capacity,
                "Dropping stored item outside vault capacity"
            );
        }
    }
    Some(page)
}

fn decode_item(raw: ItemIn) -> Option<Item> {
    let id = raw.item_id.filter(|id| !id.is_empty())?;
    let quantity = u32::try_from(raw.quantity.unwrap_or(1)).ok()?;
    let mut item = Item::new(id, quantity);
    if raw.durability.is_some() || raw.max_durability.is_some() {
        item = item.with_durability(
            raw.durability.unwrap_or_default(),
            raw.max_durability.unwrap_or_default(),
        );
    }
    match raw.metadata {
        Some(serde_json::Value::String(text)) => item = item.with_metadata(text),
        Some(serde_json::Value::Null) | None => {}
        Some(other) => item = item.with_metadata(other.to_string()),
    }
    (!item.is_absent()).then_some(item)
}

fn positive(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}
