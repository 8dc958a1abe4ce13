//! Shared data model (spec.md §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Declarative description of a tool server (spec.md §3 "ServerSpec").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSpec {
    /// Redundant with the `mcpServers` map key when loaded through
    /// `conduit-config`, which re-stamps this field from the key on load —
    /// defaulted here so a `config.json` entry need not repeat its own name.
    #[serde(default)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl ServerSpec {
    /// A stable fingerprint of the launch recipe, used to decide whether a
    /// persisted tool cache is still valid for this spec (see DESIGN.md,
    /// "tool cache invalidation by content hash").
    pub fn content_hash(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.command.hash(&mut hasher);
        self.args.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Separator used to build private-instance child names (`"<base>-<user>"`).
pub const PRIVATE_INSTANCE_SEPARATOR: char = '-';

/// Returns `true` if `base_name` would collide with the private-instance
/// naming convention for any of `existing_usernames` (spec.md §9, open
/// question — resolved as "reject at AddAndStart").
pub fn collides_with_private_naming<'a>(
    base_name: &str,
    mut existing_usernames: impl Iterator<Item = &'a str>,
) -> bool {
    existing_usernames.any(|username| {
        base_name.ends_with(username)
            && base_name.len() > username.len()
            && base_name.as_bytes()[base_name.len() - username.len() - 1]
                == PRIVATE_INSTANCE_SEPARATOR as u8
    })
}

/// Status of a `ChildInstance`'s state machine (spec.md §3/§4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChildStatus {
    Initializing,
    Running,
    Stopped,
    Error,
    Cached,
}

impl std::fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChildStatus::Initializing => "initializing",
            ChildStatus::Running => "running",
            ChildStatus::Stopped => "stopped",
            ChildStatus::Error => "error",
            ChildStatus::Cached => "cached",
        };
        f.write_str(s)
    }
}

/// One callable tool exposed by a `ChildInstance` (spec.md §3 "ToolDescriptor").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
    #[serde(skip)]
    pub server_name: String,
}

/// A `(whitelist, blacklist)` pair applied to a discovered tool set
/// (spec.md §3 "FilterPolicy").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterPolicy {
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl FilterPolicy {
    pub fn passes(&self, tool_name: &str) -> bool {
        let whitelisted = self.whitelist.is_empty() || self.whitelist.iter().any(|t| t == tool_name);
        let blacklisted = self.blacklist.iter().any(|t| t == tool_name);
        whitelisted && !blacklisted
    }
}

/// Apply two `FilterPolicy` values in precedence order (env policy first,
/// config policy second — spec.md §3). A tool must pass both.
pub fn apply_filters(
    tools: Vec<ToolDescriptor>,
    env_policy: &FilterPolicy,
    config_policy: &FilterPolicy,
) -> Vec<ToolDescriptor> {
    tools
        .into_iter()
        .filter(|t| env_policy.passes(&t.name) && config_policy.passes(&t.name))
        .collect()
}

/// A user principal (spec.md §3 "UserRecord"). `hashed_password` is never
/// serialized back out over the wire; `conduit-server` strips it before
/// building API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub hashed_password: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, UserServerOverride>,
    #[serde(default, rename = "serverTimeouts")]
    pub server_timeouts: HashMap<String, u64>,
    #[serde(default, rename = "serverTimeout")]
    pub server_timeout: Option<u64>,
}

impl UserRecord {
    /// Does this user have any override that would make a private instance
    /// of `base_name` differ from the shared instance? (spec.md §4.3)
    pub fn has_override_for(&self, base_name: &str) -> bool {
        !self.env.is_empty() || self.mcp_servers.get(base_name).is_some()
    }
}

/// Per-server override block inside a `UserRecord` (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserServerOverride {
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_policy_empty_whitelist_passes_everything_not_blacklisted() {
        let p = FilterPolicy {
            whitelist: vec![],
            blacklist: vec!["bad".into()],
        };
        assert!(p.passes("good"));
        assert!(!p.passes("bad"));
    }

    #[test]
    fn filter_policy_nonempty_whitelist_restricts() {
        let p = FilterPolicy {
            whitelist: vec!["only_this".into()],
            blacklist: vec![],
        };
        assert!(p.passes("only_this"));
        assert!(!p.passes("anything_else"));
    }

    #[test]
    fn private_naming_collision_is_detected() {
        assert!(collides_with_private_naming("calculator-donald", ["donald"].into_iter()));
        assert!(!collides_with_private_naming("calculator", ["donald"].into_iter()));
        assert!(!collides_with_private_naming("donald", ["donald"].into_iter()));
    }
}
