//! The main configuration document, `<configdir>/config.json` (spec.md §4.5).

use conduit_core::{FilterPolicy, ServerSpec};
use serde::{Deserialize, Serialize};

/// `mcpServers` is serialized as a JSON object (`name -> ServerSpec`) but
/// kept in insertion order in memory: spec.md §4.2 requires "Ordering
/// across shared children is defined by configuration insertion order; on
/// ties, leftmost wins," which a plain `HashMap` cannot provide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: OrderedServerMap,
    #[serde(default)]
    pub tools: ToolsSection,
}

#[derive(Debug, Clone, Default)]
pub struct OrderedServerMap {
    order: Vec<String>,
    specs: std::collections::HashMap<String, ServerSpec>,
}

impl OrderedServerMap {
    pub fn get(&self, name: &str) -> Option<&ServerSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Inserts or replaces in place, preserving the original position for
    /// an update (spec.md §4.2 ordering is about insertion order, not
    /// last-write order).
    pub fn insert(&mut self, spec: ServerSpec) {
        if !self.specs.contains_key(&spec.name) {
            self.order.push(spec.name.clone());
        }
        self.specs.insert(spec.name.clone(), spec);
    }

    /// Returns `true` if an entry by this name existed and was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let existed = self.specs.remove(name).is_some();
        self.order.retain(|n| n != name);
        existed
    }

    /// Iterates in insertion order, leftmost (earliest-added) first.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&String, &ServerSpec)> {
        self.order.iter().filter_map(|name| self.specs.get(name).map(|spec| (name, spec)))
    }
}

impl Serialize for OrderedServerMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for (name, spec) in self.iter_in_order() {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedServerMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // `serde_json::Map` is built with the `preserve_order` feature
        // (see Cargo.toml), so iterating it reflects `config.json`'s own
        // key order — the insertion order spec.md §4.2 requires.
        let raw: serde_json::Map<String, serde_json::Value> = serde::Deserialize::deserialize(deserializer)?;
        let mut map = OrderedServerMap::default();
        for (name, value) in raw {
            let mut spec: ServerSpec = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            spec.name = name;
            map.insert(spec);
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default, rename = "whiteList")]
    pub white_list: Vec<String>,
    #[serde(default, rename = "blackList")]
    pub black_list: Vec<String>,
}

impl ToolsSection {
    pub fn as_filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            whitelist: self.white_list.clone(),
            blacklist: self.black_list.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            command: "true".to_string(),
            args: vec![],
            env: Default::default(),
            description: None,
            disabled: false,
        }
    }

    #[test]
    fn insertion_order_is_preserved_and_updates_keep_position() {
        let mut map = OrderedServerMap::default();
        map.insert(spec("c"));
        map.insert(spec("a"));
        map.insert(spec("b"));
        let names: Vec<&str> = map.iter_in_order().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);

        map.insert(spec("a")); // update, not re-insert
        let names: Vec<&str> = map.iter_in_order().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn document_roundtrips_preserving_order() {
        let mut doc = ConfigDocument::default();
        doc.mcp_servers.insert(spec("second"));
        doc.mcp_servers.insert(spec("first"));
        let json = serde_json::to_string(&doc).unwrap();
        let back: ConfigDocument = serde_json::from_str(&json).unwrap();
        let names: Vec<&str> = back.mcp_servers.iter_in_order().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }
}
