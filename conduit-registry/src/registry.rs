//! Presents one consistent view of tools across all children and resolves a
//! tool invocation to a single host child (spec.md §4.2).

use std::sync::Arc;

use conduit_config::ConfigStore;
use conduit_core::{ChildStatus, GatewayError, GatewayResult, ToolDescriptor};
use conduit_supervisor::Supervisor;

use crate::private::PrivateInstanceManager;
use crate::principal::Principal;

pub struct Registry {
    supervisor: Arc<Supervisor>,
    config: Arc<ConfigStore>,
    private: Arc<PrivateInstanceManager>,
}

impl Registry {
    pub fn new(supervisor: Arc<Supervisor>, config: Arc<ConfigStore>, private: Arc<PrivateInstanceManager>) -> Self {
        Self { supervisor, config, private }
    }

    /// Every tool exposed by a `running` or `cached` child — cached children
    /// contribute because they can be lazily started on first invocation.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.supervisor
            .list()
            .await
            .into_iter()
            .filter(|info| matches!(info.status, ChildStatus::Running | ChildStatus::Cached))
            .flat_map(|info| info.tools)
            .collect()
    }

    /// Resolves `tool_name` to the name of the child that should host the
    /// call, honoring the private-instance shadowing tie-break: a private
    /// instance always wins over the shared child for its owning principal,
    /// regardless of configuration order.
    pub async fn resolve(&self, tool_name: &str, principal: &Principal) -> GatewayResult<String> {
        if let Principal::User(user) = principal {
            let specs = self.config.list_servers().await;

            // 1. A private instance that is already alive and exposes the tool.
            for spec in &specs {
                if let Some(child_name) = self.private.live_private(&user.username, &spec.name).await {
                    if let Some(info) = self.supervisor.get(&child_name).await {
                        if info.has_tool(tool_name) {
                            self.private.touch(&user.username, &spec.name).await;
                            return Ok(child_name);
                        }
                    }
                }
            }

            // 2. A base server the user overrides that exposes the tool on its
            // shared instance: materialize the private instance on demand.
            for spec in &specs {
                if spec.disabled || !user.has_override_for(&spec.name) {
                    continue;
                }
                let exposes = self.supervisor.get(&spec.name).await.map(|info| info.has_tool(tool_name)).unwrap_or(false);
                if exposes {
                    let child_name = self.private.ensure_private(spec, user).await?;
                    self.private.touch(&user.username, &spec.name).await;
                    return Ok(child_name);
                }
            }
        }

        // 3. First shared child in configuration insertion order. Anonymous
        // callers always land here.
        for spec in self.config.list_servers().await {
            if spec.disabled {
                continue;
            }
            if let Some(info) = self.supervisor.get(&spec.name).await {
                if info.has_tool(tool_name) {
                    return Ok(spec.name.clone());
                }
            }
        }

        Err(GatewayError::not_found(format!("tool '{tool_name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{FilterPolicy, ServerSpec, SystemClock, UserRecord};
    use std::collections::HashMap;

    fn fixture_path() -> String {
        env!("CARGO_BIN_EXE_conduit-echo-mcp-fixture").to_string()
    }

    fn spec(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            command: fixture_path(),
            args: vec![],
            env: HashMap::new(),
            description: None,
            disabled: false,
        }
    }

    fn user(username: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            hashed_password: "x".to_string(),
            admin: false,
            disabled: false,
            api_keys: vec![],
            env: HashMap::new(),
            mcp_servers: HashMap::new(),
            server_timeouts: HashMap::new(),
            server_timeout: None,
        }
    }

    async fn setup() -> (Registry, Arc<Supervisor>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::load(dir.path()).await.unwrap());
        let sup = Arc::new(Supervisor::new(config.clone(), Arc::new(SystemClock), conduit_supervisor::DEFAULT_STREAM_LIMIT, FilterPolicy::default()));
        let private = Arc::new(PrivateInstanceManager::new(sup.clone(), Arc::new(SystemClock)));
        (Registry::new(sup.clone(), config, private), sup, dir)
    }

    #[tokio::test]
    async fn resolve_falls_back_to_shared_for_anonymous() {
        let (registry, sup, _dir) = setup().await;
        sup.add_and_start(spec("echo"), None).await.unwrap();
        let resolved = registry.resolve("echo", &Principal::Anonymous).await.unwrap();
        assert_eq!(resolved, "echo");
    }

    #[tokio::test]
    async fn resolve_unknown_tool_is_not_found() {
        let (registry, _sup, _dir) = setup().await;
        let err = registry.resolve("nope", &Principal::Anonymous).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_materializes_private_instance_on_override() {
        let (registry, sup, _dir) = setup().await;
        sup.add_and_start(spec("echo"), None).await.unwrap();

        let mut donald = user("donald");
        donald.env.insert("MODE".to_string(), "x".to_string());

        let resolved = registry.resolve("echo", &Principal::User(donald)).await.unwrap();
        assert_eq!(resolved, "echo-donald");
    }

    #[tokio::test]
    async fn resolve_prefers_already_alive_private_instance_over_shared() {
        let (registry, sup, _dir) = setup().await;
        sup.add_and_start(spec("echo"), None).await.unwrap();
        let donald = user("donald");

        // No override yet: goes to shared.
        let resolved = registry.resolve("echo", &Principal::User(donald.clone())).await.unwrap();
        assert_eq!(resolved, "echo");
    }

    #[tokio::test]
    async fn list_tools_includes_cached_and_running() {
        let (registry, sup, _dir) = setup().await;
        sup.add_and_start(spec("echo"), None).await.unwrap();
        let tools = registry.list_tools().await;
        assert_eq!(tools.len(), 1);
    }
}
