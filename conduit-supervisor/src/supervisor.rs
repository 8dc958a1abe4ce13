//! `Supervisor`: child-process lifecycle and stdio JSON-RPC client
//! (spec.md §4.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use conduit_config::{CachedTools, ConfigStore};
use conduit_core::{apply_filters, collides_with_private_naming, ChildStatus, Clock, FilterPolicy, GatewayError, GatewayResult, ServerSpec, ToolDescriptor};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::child::ChildInfo;
use crate::command_rewrite::rewrite_uvx;
use crate::stdio_client::StdioClient;

const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
/// Default stdout line-buffer size (spec.md `SUBPROCESS_STREAM_LIMIT`).
pub const DEFAULT_STREAM_LIMIT: usize = 5 * 1024 * 1024;

struct Entry {
    info: ChildInfo,
    client: Option<Arc<StdioClient>>,
}

pub struct Supervisor {
    entries: RwLock<HashMap<String, Entry>>,
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
    stream_limit: usize,
    discovery_timeout: Duration,
    /// Highest-precedence filter policy, sourced from the `TOOLS_WHITELIST`
    /// / `TOOLS_BLACKLIST` environment variables (spec.md §3 "FilterPolicy").
    env_filter: FilterPolicy,
}

/// Outcome of `AddAndStart` / `Start` / `Restart` (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub info: ChildInfo,
    pub tool_count: usize,
}

impl Supervisor {
    pub fn new(config: Arc<ConfigStore>, clock: Arc<dyn Clock>, stream_limit: usize, env_filter: FilterPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
            stream_limit,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            env_filter,
        }
    }

    /// Loads every non-disabled spec from the `ConfigStore` as a `Cached`
    /// entry (spec.md §3 "ChildInstance" lifecycle: "loaded from the
    /// ConfigStore on startup"). Actual processes are spawned lazily.
    pub async fn load_from_config(&self) -> GatewayResult<()> {
        let specs = self.config.list_servers().await;
        let mut entries = self.entries.write().await;
        for spec in specs {
            if spec.disabled {
                continue;
            }
            let name = spec.name.clone();
            let cached_tools = self
                .config
                .read_tool_cache(&name)
                .await
                .ok()
                .flatten()
                .map(|c| c.tools)
                .unwrap_or_default();
            entries.insert(
                name,
                Entry {
                    info: ChildInfo::cached(spec, cached_tools, None),
                    client: None,
                },
            );
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<ChildInfo> {
        self.entries.read().await.get(name).map(|e| e.info.clone())
    }

    pub async fn list(&self) -> Vec<ChildInfo> {
        self.entries.read().await.values().map(|e| e.info.clone()).collect()
    }

    /// spec.md §4.1 `AddAndStart`.
    pub async fn add_and_start(&self, spec: ServerSpec, owner: Option<String>) -> GatewayResult<StartOutcome> {
        {
            let entries = self.entries.read().await;
            if entries.contains_key(&spec.name) {
                return Err(GatewayError::already_exists(format!("server '{}'", spec.name)));
            }
        }

        // An admin-chosen base name must not collide with the private-instance
        // naming convention "<base>-<user>" (spec.md §9, open question — resolved
        // as "reject at AddAndStart"). Private instances themselves (`owner.is_some()`)
        // are exempt: that's exactly the name this check exists to protect.
        if owner.is_none() {
            let usernames = self.config.list_users().await;
            if collides_with_private_naming(&spec.name, usernames.iter().map(|u| u.username.as_str())) {
                return Err(GatewayError::invalid(format!(
                    "server name '{}' collides with the private-instance naming convention",
                    spec.name
                )));
            }
        }

        self.config.put_server(spec.clone()).await?;
        let (client, info) = self.spawn_and_discover(&spec, owner).await?;
        let tool_count = info.tools.len();

        let mut entries = self.entries.write().await;
        entries.insert(
            spec.name.clone(),
            Entry {
                info: info.clone(),
                client: Some(client),
            },
        );
        Ok(StartOutcome { info, tool_count })
    }

    /// spec.md §4.1 `Start`: idempotent, no-op if already running.
    pub async fn start(&self, name: &str) -> GatewayResult<StartOutcome> {
        let spec = {
            let entries = self.entries.read().await;
            let entry = entries.get(name).ok_or_else(|| GatewayError::not_found(format!("server '{name}'")))?;
            if entry.info.status == ChildStatus::Running {
                return Ok(StartOutcome {
                    info: entry.info.clone(),
                    tool_count: entry.info.tools.len(),
                });
            }
            entry.info.spec.clone()
        };
        let owner = self.entries.read().await.get(name).and_then(|e| e.info.owner.clone());

        let (client, info) = self.spawn_and_discover(&spec, owner).await?;
        let tool_count = info.tools.len();
        let mut entries = self.entries.write().await;
        entries.insert(
            name.to_string(),
            Entry {
                info: info.clone(),
                client: Some(client),
            },
        );
        Ok(StartOutcome { info, tool_count })
    }

    /// spec.md §4.1 `Stop`: idempotent, transitions to `stopped` on success
    /// or `error` if even the force-kill fails.
    pub async fn stop(&self, name: &str, grace: Duration) -> GatewayResult<()> {
        let client = {
            let mut entries = self.entries.write().await;
            let entry = entries.get_mut(name).ok_or_else(|| GatewayError::not_found(format!("server '{name}'")))?;
            let client = entry.client.take();
            if client.is_none() {
                entry.info.status = ChildStatus::Stopped;
                entry.info.pid = None;
                return Ok(());
            }
            client
        };

        let Some(client) = client else { return Ok(()) };
        let result = client.shutdown(grace).await;
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.info.pid = None;
            entry.info.status = match result {
                Ok(()) => ChildStatus::Stopped,
                Err(ref e) => {
                    error!(server = name, error = %e, "failed to stop child even with force-kill");
                    ChildStatus::Error
                }
            };
        }
        result
    }

    /// spec.md §4.1 `Restart`: reads the latest spec from the `ConfigStore`,
    /// falling back to the in-memory spec on a read failure.
    pub async fn restart(&self, name: &str) -> GatewayResult<StartOutcome> {
        let in_memory_spec = {
            let entries = self.entries.read().await;
            entries
                .get(name)
                .map(|e| e.info.spec.clone())
                .ok_or_else(|| GatewayError::not_found(format!("server '{name}'")))?
        };

        let spec = match self.config.get_server(name).await {
            Some(spec) => spec,
            None => {
                warn!(server = name, "config read failed on restart, falling back to in-memory spec");
                in_memory_spec
            }
        };

        self.stop(name, DEFAULT_STOP_GRACE).await?;
        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(name) {
                entry.info.spec = spec;
            }
        }
        self.start(name).await
    }

    /// spec.md §4.1 `Delete`: stops the child, removes it from the
    /// registry, and drops its spec and tool cache from the `ConfigStore`.
    /// Removing any private-instance mapping is the caller's
    /// responsibility (`conduit-registry::private`), which composes this
    /// with its own bookkeeping.
    pub async fn delete(&self, name: &str) -> GatewayResult<()> {
        if !self.entries.read().await.contains_key(name) {
            return Err(GatewayError::not_found(format!("server '{name}'")));
        }
        // A failure to stop cleanly (e.g. force-kill also failed) is logged
        // by `stop` itself and must not block the delete the caller asked
        // for; only the "never existed" case is an error here.
        if let Err(e) = self.stop(name, DEFAULT_STOP_GRACE).await {
            warn!(server = name, error = %e, "delete: stop reported an error, proceeding with removal anyway");
        }
        self.entries.write().await.remove(name);
        self.config.delete_server(name).await
    }

    /// spec.md §4.1 `Invoke`: low-level JSON-RPC call, with lazy-start from
    /// `cached` and a single on-demand restart-and-retry on mid-session
    /// child exit.
    pub async fn invoke(&self, name: &str, method: &str, params: Option<serde_json::Value>, deadline: Duration) -> GatewayResult<serde_json::Value> {
        let needs_lazy_start = {
            let entries = self.entries.read().await;
            let entry = entries.get(name).ok_or_else(|| GatewayError::not_found(format!("server '{name}'")))?;
            entry.info.status == ChildStatus::Cached
        };
        if needs_lazy_start {
            self.start(name).await?;
        }

        match self.try_invoke_once(name, method, params.clone(), deadline).await {
            Ok(value) => Ok(value),
            Err(GatewayError::ServerUnavailable(_)) => {
                warn!(server = name, "child unavailable mid-session, attempting one restart-and-retry");
                self.mark_stopped(name).await;
                self.start(name).await?;
                self.try_invoke_once(name, method, params, deadline).await
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_stopped(&self, name: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.client = None;
            entry.info.status = ChildStatus::Stopped;
            entry.info.pid = None;
        }
    }

    async fn try_invoke_once(&self, name: &str, method: &str, params: Option<serde_json::Value>, deadline: Duration) -> GatewayResult<serde_json::Value> {
        let client = {
            let entries = self.entries.read().await;
            let entry = entries.get(name).ok_or_else(|| GatewayError::not_found(format!("server '{name}'")))?;
            match &entry.client {
                Some(client) if entry.info.status == ChildStatus::Running => client.clone(),
                _ => return Err(GatewayError::unavailable(format!("server '{name}' is not running"))),
            }
        };

        if client.try_wait_exited().await {
            self.mark_stopped(name).await;
            return Err(GatewayError::unavailable(format!("server '{name}' has exited")));
        }

        let response = client.call(method, params, deadline).await?;
        if let Some(err) = response.error {
            return Err(GatewayError::unavailable(format!("child JSON-RPC error {}: {}", err.code, err.message)));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    async fn spawn_and_discover(&self, spec: &ServerSpec, owner: Option<String>) -> GatewayResult<(Arc<StdioClient>, ChildInfo)> {
        let (command, args) = rewrite_uvx(&spec.command, &spec.args);
        info!(server = %spec.name, %command, "spawning child process");

        let client = Arc::new(StdioClient::spawn(&spec.name, &command, &args, &spec.env, self.stream_limit)?);

        match self.discover_tools(&client, spec).await {
            Ok(raw_tools) => {
                let env_policy = self.env_filter.clone();
                let config_policy = self.config.filter_policy().await;
                let filtered = apply_filters(raw_tools, &env_policy, &config_policy)
                    .into_iter()
                    .map(|mut t| {
                        t.server_name = spec.name.clone();
                        t
                    })
                    .collect::<Vec<_>>();

                self.refresh_tool_cache(spec, &filtered).await;

                let info = ChildInfo {
                    spec: spec.clone(),
                    tools: filtered,
                    status: ChildStatus::Running,
                    pid: client.pid(),
                    started_at: Some(self.clock.now()),
                    owner,
                };
                Ok((client, info))
            }
            Err(e) => {
                warn!(server = %spec.name, error = %e, "discovery failed, child kept in error state");
                let info = ChildInfo {
                    spec: spec.clone(),
                    tools: Vec::new(),
                    status: ChildStatus::Error,
                    pid: client.pid(),
                    started_at: Some(self.clock.now()),
                    owner,
                };
                Ok((client, info))
            }
        }
    }

    /// spec.md §4.1 "Discovery protocol": one `notifications/initialized`
    /// notification followed by paginated `tools/list` requests.
    async fn discover_tools(&self, client: &StdioClient, spec: &ServerSpec) -> GatewayResult<Vec<ToolDescriptor>> {
        client.notify("notifications/initialized", None)?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let response = client.call("tools/list", params, self.discovery_timeout).await?;
            if let Some(err) = response.error {
                return Err(GatewayError::unavailable(format!(
                    "'{}' tools/list returned error {}: {}",
                    spec.name, err.code, err.message
                )));
            }
            let result = response
                .result
                .ok_or_else(|| GatewayError::unavailable(format!("'{}' tools/list returned no result", spec.name)))?;

            let page = result
                .get("tools")
                .and_then(|v| v.as_array())
                .ok_or_else(|| GatewayError::unavailable(format!("'{}' tools/list result missing tools array", spec.name)))?;

            for raw in page {
                let name = raw.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                if name.is_empty() {
                    continue;
                }
                tools.push(ToolDescriptor {
                    name,
                    description: raw.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    input_schema: raw.get("inputSchema").cloned().unwrap_or(serde_json::Value::Null),
                    server_name: spec.name.clone(),
                });
            }

            cursor = result
                .get("nextCursor")
                .and_then(|v| v.as_str())
                .filter(|c| !c.is_empty())
                .map(|c| c.to_string());
            if cursor.is_none() {
                break;
            }
        }
        debug!(server = %spec.name, count = tools.len(), "discovery complete");
        Ok(tools)
    }

    /// Write-once per spec.md, with the content-hash invalidation
    /// supplement recorded in DESIGN.md: if the persisted cache's spec hash
    /// no longer matches (`command`/`args` changed), the stale cache is
    /// dropped so the fresh discovery is written in its place.
    async fn refresh_tool_cache(&self, spec: &ServerSpec, tools: &[ToolDescriptor]) {
        let hash = spec.content_hash();
        if let Ok(Some(existing)) = self.config.read_tool_cache(&spec.name).await {
            if existing.spec_hash.as_deref() != Some(hash.as_str()) {
                info!(server = %spec.name, "launch recipe changed, invalidating stale tool cache");
                let _ = self.config.delete_tool_cache(&spec.name).await;
            }
        }
        let cached = CachedTools {
            tools: tools.to_vec(),
            spec_hash: Some(hash),
        };
        if let Err(e) = self.config.write_tool_cache_if_absent(&spec.name, &cached).await {
            warn!(server = %spec.name, error = %e, "failed to persist tool cache");
        }
    }

    /// Stops every supervised child within `grace`. Returns `true` only if
    /// every child stopped cleanly — `main.rs` uses this to pick between
    /// exit code `0` and the forced-exit code `2` (spec.md §6 "Exit codes").
    pub async fn shutdown_all(&self, grace: Duration) -> bool {
        let names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        let mut all_stopped = true;
        for name in names {
            if let Err(e) = self.stop(&name, grace).await {
                error!(server = %name, error = %e, "error during shutdown stop");
                all_stopped = false;
            }
        }
        all_stopped
    }
}

#[allow(dead_code)]
fn _assert_send_sync()
where
    Supervisor: Send + Sync,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::SystemClock;
    use std::collections::HashMap as Map;

    fn fixture_path() -> String {
        env!("CARGO_BIN_EXE_conduit-echo-mcp-fixture").to_string()
    }

    async fn test_supervisor() -> (Supervisor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::load(dir.path()).await.unwrap());
        let sup = Supervisor::new(config, Arc::new(SystemClock), DEFAULT_STREAM_LIMIT, FilterPolicy::default());
        (sup, dir)
    }

    fn echo_spec(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            command: fixture_path(),
            args: vec![],
            env: Map::new(),
            description: None,
            disabled: false,
        }
    }

    #[tokio::test]
    async fn add_and_start_discovers_tools_and_invokes() {
        let (sup, _dir) = test_supervisor().await;
        let outcome = sup.add_and_start(echo_spec("echo"), None).await.unwrap();
        assert_eq!(outcome.tool_count, 1);
        assert_eq!(outcome.info.status, ChildStatus::Running);

        let result = sup
            .invoke("echo", "tools/call", Some(json!({"name": "echo", "arguments": {"text": "hi"}})), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn add_and_start_rejects_duplicate_name() {
        let (sup, _dir) = test_supervisor().await;
        sup.add_and_start(echo_spec("echo"), None).await.unwrap();
        let err = sup.add_and_start(echo_spec("echo"), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn add_and_start_rejects_name_colliding_with_private_instance_convention() {
        let (sup, _dir) = test_supervisor().await;
        sup.config
            .put_user(conduit_core::UserRecord {
                username: "donald".to_string(),
                hashed_password: "x".to_string(),
                admin: false,
                disabled: false,
                api_keys: vec![],
                env: Map::new(),
                mcp_servers: Map::new(),
                server_timeouts: Map::new(),
                server_timeout: None,
            })
            .await
            .unwrap();
        let err = sup.add_and_start(echo_spec("calculator-donald"), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn add_and_start_allows_private_owned_name_to_bypass_collision_check() {
        let (sup, _dir) = test_supervisor().await;
        sup.config
            .put_user(conduit_core::UserRecord {
                username: "donald".to_string(),
                hashed_password: "x".to_string(),
                admin: false,
                disabled: false,
                api_keys: vec![],
                env: Map::new(),
                mcp_servers: Map::new(),
                server_timeouts: Map::new(),
                server_timeout: None,
            })
            .await
            .unwrap();
        let outcome = sup.add_and_start(echo_spec("calculator-donald"), Some("donald".to_string())).await.unwrap();
        assert_eq!(outcome.info.owner.as_deref(), Some("donald"));
    }

    #[tokio::test]
    async fn stop_then_invoke_is_unavailable() {
        let (sup, _dir) = test_supervisor().await;
        sup.add_and_start(echo_spec("echo"), None).await.unwrap();
        sup.stop("echo", Duration::from_secs(2)).await.unwrap();
        let err = sup.invoke("echo", "tools/call", None, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::ServerUnavailable(_)));
    }

    #[tokio::test]
    async fn restart_preserves_tool_count() {
        let (sup, _dir) = test_supervisor().await;
        let first = sup.add_and_start(echo_spec("echo"), None).await.unwrap();
        let restarted = sup.restart("echo").await.unwrap();
        assert_eq!(first.tool_count, restarted.tool_count);
    }

    #[tokio::test]
    async fn delete_removes_entry_and_cache() {
        let (sup, _dir) = test_supervisor().await;
        sup.add_and_start(echo_spec("echo"), None).await.unwrap();
        sup.delete("echo").await.unwrap();
        assert!(sup.get("echo").await.is_none());
        assert!(sup.config.read_tool_cache("echo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_on_unknown_server_is_not_found() {
        let (sup, _dir) = test_supervisor().await;
        let err = sup.delete("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_on_unknown_server_is_not_found() {
        let (sup, _dir) = test_supervisor().await;
        let err = sup.invoke("nope", "tools/call", None, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}
