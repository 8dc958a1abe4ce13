//! Per-user JSON file I/O, `<configdir>/users/<username>.json` (spec.md §4.5).

use std::path::{Path, PathBuf};

use conduit_core::{GatewayError, GatewayResult, UserRecord};

pub fn user_path(users_dir: &Path, username: &str) -> PathBuf {
    users_dir.join(format!("{username}.json"))
}

pub fn load_user(users_dir: &Path, username: &str) -> GatewayResult<Option<UserRecord>> {
    let path = user_path(users_dir, username);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)?;
    let record: UserRecord = serde_json::from_str(&raw)?;
    Ok(Some(record))
}

pub fn load_all_users(users_dir: &Path) -> GatewayResult<Vec<UserRecord>> {
    if !users_dir.exists() {
        return Ok(Vec::new());
    }
    let mut users = Vec::new();
    for entry in std::fs::read_dir(users_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let record: UserRecord = serde_json::from_str(&raw).map_err(|e| {
            GatewayError::internal(format!("malformed user file {}: {e}", path.display()))
        })?;
        users.push(record);
    }
    Ok(users)
}

/// Atomic write: write to a temp file in the same directory, then rename
/// over the target (spec.md §4.5 "saves rewrite the entire target file
/// atomically").
pub fn save_user(users_dir: &Path, record: &UserRecord) -> GatewayResult<()> {
    std::fs::create_dir_all(users_dir)?;
    let target = user_path(users_dir, &record.username);
    atomic_write(&target, &serde_json::to_vec_pretty(record)?)
}

pub fn delete_user(users_dir: &Path, username: &str) -> GatewayResult<()> {
    let path = user_path(users_dir, username);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

pub fn atomic_write(target: &Path, bytes: &[u8]) -> GatewayResult<()> {
    let tmp = target.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_user(name: &str) -> UserRecord {
        UserRecord {
            username: name.to_string(),
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

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let user = sample_user("donald");
        save_user(dir.path(), &user).unwrap();
        let loaded = load_user(dir.path(), "donald").unwrap().unwrap();
        assert_eq!(loaded.username, "donald");
    }

    #[test]
    fn missing_user_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_user(dir.path(), "nobody").unwrap().is_none());
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let user = sample_user("donald");
        save_user(dir.path(), &user).unwrap();
        delete_user(dir.path(), "donald").unwrap();
        assert!(load_user(dir.path(), "donald").unwrap().is_none());
    }
}
