//! ConfigStore adapter (spec.md §4.5): loads/persists the main configuration
//! document, one JSON file per user, and the write-once tool cache.
//!
//! Grounded on `ratchet-config`'s layered-loader philosophy (typed sections,
//! validated at the boundary) but storage itself follows the gateway's own
//! three-file layout rather than `ratchet-config`'s TOML/YAML domains, which
//! govern the *process*, not the documents this crate owns.

mod admin;
mod cache;
mod document;
mod store;
mod users;

pub use admin::{hash_password, verify_password, ADMIN_DEFAULT_PASSWORD_ENV, ADMIN_USERNAME, SALT_ENV};
pub use cache::CachedTools;
pub use document::ConfigDocument;
pub use store::ConfigStore;
