//! Per-user private instances: lazily materializing a dedicated child when a
//! user's configuration makes the effective command differ from the shared
//! instance, and garbage-collecting them when idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use conduit_config::ConfigStore;
use conduit_core::{Clock, GatewayError, GatewayResult, ServerSpec, UserRecord, PRIVATE_INSTANCE_SEPARATOR};
use conduit_supervisor::{ChildInfo, Supervisor};
use tokio::sync::RwLock;
use tracing::{info, warn};

const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(3600);

fn private_name(base: &str, user: &str) -> String {
    format!("{base}{PRIVATE_INSTANCE_SEPARATOR}{user}")
}

/// Tracked alongside the `Supervisor`'s own `ChildInfo` since idle-GC needs
/// "last successfully routed Invoke", which the Supervisor has no notion of.
struct Mapping {
    child_name: String,
    last_used_at: SystemTime,
}

pub struct PrivateInstanceManager {
    supervisor: Arc<Supervisor>,
    clock: Arc<dyn Clock>,
    /// `user -> base_name -> Mapping`.
    mappings: RwLock<HashMap<String, HashMap<String, Mapping>>>,
}

impl PrivateInstanceManager {
    pub fn new(supervisor: Arc<Supervisor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            supervisor,
            clock,
            mappings: RwLock::new(HashMap::new()),
        }
    }

    fn effective_spec(base: &ServerSpec, user: &UserRecord) -> ServerSpec {
        let mut spec = base.clone();
        spec.name = private_name(&base.name, &user.username);

        if let Some(over) = user.mcp_servers.get(&base.name) {
            if let Some(args) = &over.args {
                spec.args = args.clone();
            }
            if let Some(disabled) = over.disabled {
                spec.disabled = disabled;
            }

            let mut env = base.env.clone();
            env.extend(user.env.clone());
            if let Some(over_env) = &over.env {
                env.extend(over_env.clone());
            }
            spec.env = env;
        } else {
            let mut env = base.env.clone();
            env.extend(user.env.clone());
            spec.env = env;
        }
        spec
    }

    /// Idempotent: two concurrent calls with the same `(user, base_name)`
    /// observe the same `child_name` and spawn only one process, since the
    /// write lock over `mappings` serializes the check-then-spawn.
    pub async fn ensure_private(&self, base: &ServerSpec, user: &UserRecord) -> GatewayResult<String> {
        let mut mappings = self.mappings.write().await;
        let per_user = mappings.entry(user.username.clone()).or_default();

        if let Some(existing) = per_user.get_mut(&base.name) {
            if self.supervisor.get(&existing.child_name).await.is_some() {
                existing.last_used_at = self.clock.now();
                return Ok(existing.child_name.clone());
            }
            per_user.remove(&base.name);
        }

        let spec = Self::effective_spec(base, user);
        let child_name = spec.name.clone();
        info!(user = %user.username, base = %base.name, child = %child_name, "materializing private instance");

        if self.supervisor.get(&child_name).await.is_some() {
            self.supervisor.start(&child_name).await?;
        } else {
            self.supervisor.add_and_start(spec, Some(user.username.clone())).await?;
        }

        per_user.insert(
            base.name.clone(),
            Mapping {
                child_name: child_name.clone(),
                last_used_at: self.clock.now(),
            },
        );
        Ok(child_name)
    }

    /// Returns the private child name for `(user, base_name)` if one is
    /// currently alive, without materializing a new one.
    pub async fn live_private(&self, user: &str, base_name: &str) -> Option<String> {
        let mappings = self.mappings.read().await;
        let mapping = mappings.get(user)?.get(base_name)?;
        self.supervisor.get(&mapping.child_name).await.map(|_| mapping.child_name.clone())
    }

    pub async fn touch(&self, user: &str, base_name: &str) {
        if let Some(per_user) = self.mappings.write().await.get_mut(user) {
            if let Some(mapping) = per_user.get_mut(base_name) {
                mapping.last_used_at = self.clock.now();
            }
        }
    }

    pub async fn stop_private(&self, user: &str, base_name: &str) -> GatewayResult<()> {
        let child_name = {
            let mut mappings = self.mappings.write().await;
            let per_user = mappings.get_mut(user).ok_or_else(|| GatewayError::not_found(format!("no private instances for user '{user}'")))?;
            let mapping = per_user.remove(base_name).ok_or_else(|| GatewayError::not_found(format!("private instance '{base_name}' for user '{user}'")))?;
            mapping.child_name
        };
        self.supervisor.delete(&child_name).await
    }

    pub async fn list_for_user(&self, user: &str) -> Vec<ChildInfo> {
        let names: Vec<String> = match self.mappings.read().await.get(user) {
            Some(per_user) => per_user.values().map(|m| m.child_name.clone()).collect(),
            None => return Vec::new(),
        };
        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            if let Some(info) = self.supervisor.get(&name).await {
                infos.push(info);
            }
        }
        infos
    }

    fn timeout_for(user: &UserRecord, base_name: &str) -> Duration {
        user.server_timeouts
            .get(base_name)
            .or(user.server_timeout.as_ref())
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(DEFAULT_SERVER_TIMEOUT)
    }

    /// Stops every private child idle longer than its configured timeout.
    /// `users` supplies the timeout configuration per username, since the
    /// manager itself holds no reference to `ConfigStore`'s user records —
    /// the caller (a periodic task wired with a `ConfigStore`) passes them in.
    pub async fn cleanup_idle(&self, now: SystemTime, users: &HashMap<String, UserRecord>) {
        let stale: Vec<(String, String, String)> = {
            let mappings = self.mappings.read().await;
            mappings
                .iter()
                .flat_map(|(user, per_user)| {
                    per_user.iter().filter_map(move |(base, mapping)| {
                        let timeout = users.get(user).map(|u| Self::timeout_for(u, base)).unwrap_or(DEFAULT_SERVER_TIMEOUT);
                        let idle = now.duration_since(mapping.last_used_at).unwrap_or_default();
                        (idle > timeout).then(|| (user.clone(), base.clone(), mapping.child_name.clone()))
                    })
                })
                .collect()
        };

        for (user, base, child_name) in stale {
            info!(%user, base = %base, child = %child_name, "idle timeout exceeded, stopping private instance");
            if let Err(e) = self.supervisor.delete(&child_name).await {
                warn!(%user, child = %child_name, error = %e, "failed to stop idle private instance");
                continue;
            }
            if let Some(per_user) = self.mappings.write().await.get_mut(&user) {
                per_user.remove(&base);
            }
        }
    }

    /// Spawns the periodic `CleanupIdle` task (spec.md §4.3), cancellable
    /// via `token` which is tied to process shutdown.
    pub fn spawn_cleanup_task(
        manager: Arc<Self>,
        config: Arc<ConfigStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        token: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("private-instance cleanup task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let users = config.list_users().await.into_iter().map(|u| (u.username.clone(), u)).collect();
                        manager.cleanup_idle(clock.now(), &users).await;
                    }
                }
            }
        })
    }
}
