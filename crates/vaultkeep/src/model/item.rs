//! Stored item stacks.

/// Durability pair carried by tools and armour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Durability {
    pub current: f64,
    pub max: f64,
}

/// An opaque item stack as the vault stores it.
///
/// The vault never interprets `id` or `metadata`; it only needs to know whether
/// the stack is present. A stack with an empty id or zero quantity is *absent*
/// and behaves exactly like an empty slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: String,
    quantity: u32,
    durability: Option<Durability>,
    metadata: Option<String>,
}

impl Item {
    /// Create a plain stack with no durability or metadata.
    pub fn new(id: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: id.into(),
            quantity,
            durability: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_durability(mut self, current: f64, max: f64) -> Self {
        self.durability = Some(Durability { current, max });
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn durability(&self) -> Option<Durability> {
        self.durability
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// True if this stack counts as an empty slot.
    pub fn is_absent(&self) -> bool {
        self.id.is_empty() || self.quantity == 0
    }
}

/// Normalize an optional stack: absent stacks collapse to `None`.
pub(crate) fn present(item: Option<Item>) -> Option<Item> {
    item.filter(|i| !i.is_absent())
}
