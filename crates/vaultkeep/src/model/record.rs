//! An owner's complete vault storage.

use std::collections::BTreeMap;

use super::item::Item;
use super::page::VaultPage;

/// Defaults applied when building or decoding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    /// Owner key the record belongs to.
    pub owner: String,
    /// Slot capacity used for pages that don't say otherwise.
    pub capacity: u32,
}

impl RecordDefaults {
    pub fn new(owner: impl Into<String>, capacity: u32) -> Self {
        Self {
            owner: owner.into(),
            capacity,
        }
    }
}

/// All vaults owned by one owner key.
///
/// Pages are materialized lazily: a vault number is present in the map only
/// after it was opened or written. Every mutation bumps `revision` and sets
/// `dirty`; `dirty` is cleared only by [`mark_clean`](Self::mark_clean) with
/// the revision that was actually persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultRecord {
    owner: String,
    default_capacity: u32,
    pages: BTreeMap<u32, VaultPage>,
    dirty: bool,
    revision: u64,
}

impl VaultRecord {
    /// A record for an owner with no prior data.
    pub fn new(owner: impl Into<String>, default_capacity: u32) -> Self {
        Self {
            owner: owner.into(),
            default_capacity: default_capacity.max(1),
            pages: BTreeMap::new(),
            dirty: false,
            revision: 0,
        }
    }

    pub fn fresh(defaults: &RecordDefaults) -> Self {
        Self::new(defaults.owner.clone(), defaults.capacity)
    }

    /// Insert a decoded page without touching the dirty state.
    pub(crate) fn restore_page(&mut self, page: VaultPage) {
        self.pages.insert(page.number(), page);
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn default_capacity(&self) -> u32 {
        self.default_capacity
    }

    // ------------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Clear the dirty flag if nothing changed since `revision` was captured.
    ///
    /// Returns whether the record is now clean.
    pub fn mark_clean(&mut self, revision: u64) -> bool {
        if self.revision == revision {
            self.dirty = false;
        }
        !self.dirty
    }

    // ------------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------------

    pub fn page(&self, number: u32) -> Option<&VaultPage> {
        self.pages.get(&number)
    }

    /// Get a page, materializing it with `capacity` slots on first access.
    ///
    /// An existing page keeps the capacity it was created with. Materializing
    /// an empty page is not a mutation: empty pages are never persisted.
    pub fn page_or_create(&mut self, number: u32, capacity: u32) -> &VaultPage {
        self.pages
            .entry(number)
            .or_insert_with(|| VaultPage::new(number, capacity.max(1)))
    }

    pub fn pages(&self) -> impl Iterator<Item = &VaultPage> {
        self.pages.values()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Write one slot, materializing the page if needed.
    ///
    /// Returns `false` when the slot is outside the page; the record is left
    /// untouched in that case.
    pub fn set_item(&mut self, number: u32, slot: u32, item: Option<Item>, capacity: u32) -> bool {
        let page = self
            .pages
            .entry(number)
            .or_insert_with(|| VaultPage::new(number, capacity.max(1)));
        let applied = page.set(slot, item);
        if applied {
            self.mark_dirty();
        }
        applied
    }

    pub fn get_item(&self, number: u32, slot: u32) -> Option<&Item> {
        self.pages.get(&number).and_then(|page| page.get(slot))
    }

    /// Overwrite a page's contents from a session's dense working view.
    pub fn replace_page(&mut self, number: u32, capacity: u32, view: &[Option<Item>]) {
        self.pages
            .entry(number)
            .or_insert_with(|| VaultPage::new(number, capacity.max(1)))
            .replace_with(view);
        self.mark_dirty();
    }

    /// Empty every page.
    pub fn clear_all(&mut self) {
        for page in self.pages.values_mut() {
            page.clear();
        }
        self.mark_dirty();
    }

    pub fn total_items(&self) -> usize {
        self.pages.values().map(VaultPage::item_count).sum()
    }
}
