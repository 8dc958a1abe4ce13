//! Tool cache, `<configdir>/cache/<name>.json` (spec.md §4.1, §4.5, invariant 4
//! in §8: a cache file exists iff the server has been discovered at least
//! once and has not since been deleted).
//!
//! DESIGN.md records the decision to supplement the write-once cache with a
//! `spec_hash` field (`ServerSpec::content_hash`) so a changed launch recipe
//! can be detected even though the file itself is never rewritten in place —
//! callers compare the stored hash and decide whether to force rediscovery.

use conduit_core::ToolDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTools {
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, rename = "specHash")]
    pub spec_hash: Option<String>,
}
