//! File-based storage implementations.
//!
//! One JSON document per owner. Writes go to a temp file that is renamed over
//! the target, so a crash mid-save leaves the previous document intact.

mod vault;

pub use vault::{FileVaultStore, is_valid_owner_key};
