//! The externally-visible half of a `ChildInstance` (spec.md §3): the part
//! that is safe to clone, serialize, and hand to `conduit-registry` or the
//! HTTP layer. The live process handle and stdio tasks stay inside
//! `Supervisor`'s own `Entry` bookkeeping (`supervisor.rs`) since they are
//! never meaningfully serialized.

use std::time::SystemTime;

use conduit_core::{ChildStatus, ServerSpec, ToolDescriptor};

#[derive(Debug, Clone)]
pub struct ChildInfo {
    pub spec: ServerSpec,
    pub tools: Vec<ToolDescriptor>,
    pub status: ChildStatus,
    pub pid: Option<u32>,
    pub started_at: Option<SystemTime>,
    pub owner: Option<String>,
}

impl ChildInfo {
    pub fn cached(spec: ServerSpec, tools: Vec<ToolDescriptor>, owner: Option<String>) -> Self {
        Self {
            spec,
            tools,
            status: ChildStatus::Cached,
            pid: None,
            started_at: None,
            owner,
        }
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t.name == tool_name)
    }
}
