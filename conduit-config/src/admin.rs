//! Admin bootstrap (spec.md §4.5): on first read of `"admin"` the store
//! synthesizes a user from `ADMIN_DEFAULT_PASSWORD` (default `"admin"`),
//! hashed with `bcrypt` plus a fixed pepper read from `SALT`.

use std::collections::HashMap;

use conduit_core::{GatewayError, GatewayResult, UserRecord};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_DEFAULT_PASSWORD_ENV: &str = "ADMIN_DEFAULT_PASSWORD";
pub const SALT_ENV: &str = "SALT";

const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DEFAULT_SALT: &str = "conduit-default-pepper";
const BCRYPT_COST: u32 = 12;

pub fn hash_password(password: &str) -> GatewayResult<String> {
    let pepper = std::env::var(SALT_ENV).unwrap_or_else(|_| DEFAULT_SALT.to_string());
    let peppered = format!("{password}{pepper}");
    bcrypt::hash(peppered, BCRYPT_COST).map_err(|e| GatewayError::internal(format!("bcrypt hash failed: {e}")))
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    let pepper = std::env::var(SALT_ENV).unwrap_or_else(|_| DEFAULT_SALT.to_string());
    let peppered = format!("{password}{pepper}");
    bcrypt::verify(peppered, hashed).unwrap_or(false)
}

/// Synthesize the admin user's initial `UserRecord` (spec.md §4.5).
pub fn synthesize_admin() -> GatewayResult<UserRecord> {
    let password = std::env::var(ADMIN_DEFAULT_PASSWORD_ENV).unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string());
    let hashed_password = hash_password(&password)?;
    Ok(UserRecord {
        username: ADMIN_USERNAME.to_string(),
        hashed_password,
        admin: true,
        disabled: false,
        api_keys: Vec::new(),
        env: HashMap::new(),
        mcp_servers: HashMap::new(),
        server_timeouts: HashMap::new(),
        server_timeout: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hashed));
        assert!(!verify_password("wrong", &hashed));
    }

    #[test]
    fn synthesized_admin_is_an_admin() {
        let admin = synthesize_admin().unwrap();
        assert_eq!(admin.username, ADMIN_USERNAME);
        assert!(admin.admin);
        assert!(!admin.disabled);
    }
}
