//! Vault data model and its persisted document format.

pub mod document;
mod item;
mod page;
mod record;

pub use document::{deserialize, serialize};
pub use item::{Durability, Item};
pub use page::VaultPage;
pub use record::{RecordDefaults, VaultRecord};
