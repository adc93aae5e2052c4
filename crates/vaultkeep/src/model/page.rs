//! A single numbered vault and its slots.

use std::collections::BTreeMap;

use super::item::{Item, present};

/// One numbered vault.
///
/// Slots are stored sparsely: only present stacks occupy an entry. Slot
/// indices outside `0..capacity` are ignored on both read and write, and the
/// capacity never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultPage {
    number: u32,
    capacity: u32,
    slots: BTreeMap<u32, Item>,
}

impl VaultPage {
    pub fn new(number: u32, capacity: u32) -> Self {
        Self {
            number,
            capacity,
            slots: BTreeMap::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn contains_slot(&self, slot: u32) -> bool {
        slot < self.capacity
    }

    pub fn get(&self, slot: u32) -> Option<&Item> {
        self.slots.get(&slot)
    }

    /// Put a stack into a slot, or empty it when `item` is absent.
    ///
    /// Returns `false` (and changes nothing) when the slot is out of range.
    pub fn set(&mut self, slot: u32, item: Option<Item>) -> bool {
        if !self.contains_slot(slot) {
            return false;
        }
        match present(item) {
            Some(item) => {
                self.slots.insert(slot, item);
            }
            None => {
                self.slots.remove(&slot);
            }
        }
        true
    }

    pub fn clear_slot(&mut self, slot: u32) -> bool {
        self.set(slot, None)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Replace every slot with the given dense view (index = slot).
    ///
    /// Entries beyond the page capacity are dropped.
    pub fn replace_with(&mut self, view: &[Option<Item>]) {
        self.slots.clear();
        for (slot, item) in view.iter().enumerate() {
            let Ok(slot) = u32::try_from(slot) else {
                break;
            };
            self.set(slot, item.clone());
        }
    }

    /// Dense copy of the page, one entry per slot.
    pub fn to_view(&self) -> Vec<Option<Item>> {
        let mut view = vec![None; self.capacity as usize];
        for (slot, item) in &self.slots {
            view[*slot as usize] = Some(item.clone());
        }
        view
    }

    pub fn items(&self) -> impl Iterator<Item = (u32, &Item)> {
        self.slots.iter().map(|(slot, item)| (*slot, item))
    }

    pub fn item_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_in_range() {
        let mut page = VaultPage::new(1, 4);
        assert!(page.set(2, Some(Item::new("torch", 16))));
        assert_eq!(page.get(2).map(Item::id), Some("torch"));
        assert_eq!(page.item_count(), 1);
    }

    #[test]
    fn out_of_range_is_noop() {
        let mut page = VaultPage::new(1, 4);
        assert!(!page.set(4, Some(Item::new("torch", 1))));
        assert!(!page.set(u32::MAX, Some(Item::new("torch", 1))));
        assert!(page.get(4).is_none());
        assert!(page.is_empty());
        assert_eq!(page.capacity(), 4);
    }

    #[test]
    fn absent_item_removes_entry() {
        let mut page = VaultPage::new(1, 4);
        page.set(0, Some(Item::new("torch", 1)));
        assert!(page.set(0, Some(Item::new("torch", 0))));
        assert!(page.is_empty());

        page.set(1, Some(Item::new("log", 3)));
        assert!(page.clear_slot(1));
        assert!(page.get(1).is_none());
    }

    #[test]
    fn view_roundtrip_keeps_sparse_entries() {
        let mut page = VaultPage::new(3, 3);
        page.set(1, Some(Item::new("gem", 2)));

        let view = page.to_view();
        assert_eq!(view.len(), 3);
        assert!(view[0].is_none());
        assert_eq!(view[1].as_ref().map(Item::quantity), Some(2));

        let mut other = VaultPage::new(3, 3);
        other.set(0, Some(Item::new("stale", 1)));
        other.replace_with(&view);
        assert_eq!(other, page);
    }

    #[test]
    fn replace_with_drops_overflow() {
        let mut page = VaultPage::new(1, 2);
        let view = vec![
            Some(Item::new("a", 1)),
            None,
            Some(Item::new("overflow", 1)),
        ];
        page.replace_with(&view);
        assert_eq!(page.item_count(), 1);
        assert!(page.get(2).is_none());
    }
}
