//! `ConfigStore`: the single point of truth for servers, the tool filter
//! policy, users, and the tool cache (spec.md §4.5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use conduit_core::{FilterPolicy, GatewayError, GatewayResult, ServerSpec, UserRecord};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::admin::{synthesize_admin, ADMIN_USERNAME};
use crate::cache::CachedTools;
use crate::document::ConfigDocument;
use crate::users;

pub struct ConfigStore {
    config_path: PathBuf,
    users_dir: PathBuf,
    cache_dir: PathBuf,
    document: RwLock<ConfigDocument>,
    /// Single in-process lock serializing all mutations of the user map
    /// (spec.md §4.5 "Concurrency"). The guarded value is the in-memory
    /// read cache, refreshed on every write and at startup.
    users: Mutex<HashMap<String, UserRecord>>,
}

impl ConfigStore {
    /// Load (or initialize) the store rooted at `root` (spec.md
    /// `CONFIG_STORAGE_PATH`). Creates `config.json`, `users/`, and
    /// `cache/` if they do not already exist.
    pub async fn load(root: impl Into<PathBuf>) -> GatewayResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let config_path = root.join("config.json");
        let users_dir = root.join("users");
        let cache_dir = root.join("cache");
        std::fs::create_dir_all(&users_dir)?;
        std::fs::create_dir_all(&cache_dir)?;

        let document = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&raw)?
        } else {
            info!(path = %config_path.display(), "no config.json found, starting from an empty document");
            ConfigDocument::default()
        };

        let loaded_users = users::load_all_users(&users_dir)?;
        let mut user_map = HashMap::new();
        for user in loaded_users {
            user_map.insert(user.username.clone(), user);
        }

        Ok(Self {
            config_path,
            users_dir,
            cache_dir,
            document: RwLock::new(document),
            users: Mutex::new(user_map),
        })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{name}.json"))
    }

    async fn persist_document(&self, document: &ConfigDocument) -> GatewayResult<()> {
        users::atomic_write(&self.config_path, &serde_json::to_vec_pretty(document)?)
    }

    // --- servers -----------------------------------------------------

    /// Returns every known `ServerSpec` in configuration insertion order
    /// (spec.md §4.2 "Ordering across shared children").
    pub async fn list_servers(&self) -> Vec<ServerSpec> {
        self.document.read().await.mcp_servers.iter_in_order().map(|(_, spec)| spec.clone()).collect()
    }

    pub async fn get_server(&self, name: &str) -> Option<ServerSpec> {
        self.document.read().await.mcp_servers.get(name).cloned()
    }

    pub async fn put_server(&self, spec: ServerSpec) -> GatewayResult<()> {
        let mut document = self.document.write().await;
        document.mcp_servers.insert(spec);
        self.persist_document(&document).await
    }

    /// Removes the spec and its tool cache (spec.md §4.1 `Delete`). Mirrors
    /// the original's `lifecycle.py` "Server '{name}' not found" check: a
    /// name that isn't present is a `NotFound` error, not a silent no-op.
    pub async fn delete_server(&self, name: &str) -> GatewayResult<()> {
        {
            let mut document = self.document.write().await;
            if !document.mcp_servers.remove(name) {
                return Err(GatewayError::not_found(format!("server '{name}'")));
            }
            self.persist_document(&document).await?;
        }
        self.delete_tool_cache(name).await
    }

    pub async fn filter_policy(&self) -> FilterPolicy {
        self.document.read().await.tools.as_filter_policy()
    }

    // --- users ---------------------------------------------------------

    /// Reads a user, lazily bootstrapping `"admin"` on its first read
    /// (spec.md §4.5 "Admin bootstrap").
    pub async fn get_user(&self, username: &str) -> GatewayResult<Option<UserRecord>> {
        let mut guard = self.users.lock().await;
        if let Some(user) = guard.get(username) {
            return Ok(Some(user.clone()));
        }
        if username == ADMIN_USERNAME {
            let admin = synthesize_admin()?;
            users::save_user(&self.users_dir, &admin)?;
            guard.insert(admin.username.clone(), admin.clone());
            info!("synthesized default admin user on first read");
            return Ok(Some(admin));
        }
        Ok(None)
    }

    pub async fn list_users(&self) -> Vec<UserRecord> {
        self.users.lock().await.values().cloned().collect()
    }

    pub async fn put_user(&self, record: UserRecord) -> GatewayResult<()> {
        let mut guard = self.users.lock().await;
        users::save_user(&self.users_dir, &record)?;
        guard.insert(record.username.clone(), record);
        Ok(())
    }

    /// Admin-only deletion; the invariant that a user cannot delete
    /// themselves is enforced by the caller (the HTTP handler), which knows
    /// the requesting principal — the store itself has no notion of "who is
    /// asking".
    pub async fn delete_user(&self, username: &str) -> GatewayResult<()> {
        let mut guard = self.users.lock().await;
        if !guard.contains_key(username) {
            return Err(GatewayError::not_found(format!("user '{username}'")));
        }
        users::delete_user(&self.users_dir, username)?;
        guard.remove(username);
        Ok(())
    }

    // --- tool cache ------------------------------------------------------

    pub async fn read_tool_cache(&self, name: &str) -> GatewayResult<Option<CachedTools>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Write-once: a cache file is never overwritten by rediscovery once it
    /// exists (spec.md §4.1, invariant 4 in §8).
    pub async fn write_tool_cache_if_absent(&self, name: &str, cached: &CachedTools) -> GatewayResult<()> {
        let path = self.cache_path(name);
        if path.exists() {
            debug!(server = name, "tool cache already present, write-once skip");
            return Ok(());
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(cached)?).await?;
        Ok(())
    }

    pub async fn delete_tool_cache(&self, name: &str) -> GatewayResult<()> {
        let path = self.cache_path(name);
        if path.exists() {
            tokio::fs::remove_file(&path).await.map_err(|e| {
                warn!(server = name, error = %e, "failed to remove tool cache");
                GatewayError::from(e)
            })?;
        }
        Ok(())
    }

    pub fn config_root(&self) -> &Path {
        self.config_path.parent().unwrap_or(&self.config_path)
    }
}
