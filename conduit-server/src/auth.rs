//! Bearer/API-key authentication, modeled on `ratchet-web`'s
//! `middleware::auth` (JWT claims struct, `JwtManager`, header extraction)
//! but resolving into a `conduit_registry::Principal` instead of Ratchet's
//! `AuthContext`, since the gateway's routing decisions are keyed off a
//! `UserRecord`, not a role string.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use conduit_config::{ConfigStore, SALT_ENV};
use conduit_core::GatewayError;
use conduit_registry::Principal;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const JWT_ISSUER: &str = "conduit";
const JWT_AUDIENCE: &str = "conduit-clients";
const TOKEN_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String,
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn issue(&self, username: &str, admin: bool) -> Result<String, GatewayError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: username.to_string(),
            admin,
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_EXPIRY_HOURS)).timestamp(),
            iss: JWT_ISSUER.to_string(),
            aud: JWT_AUDIENCE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| GatewayError::internal(format!("failed to issue token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, GatewayError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[JWT_ISSUER]);
        validation.set_audience(&[JWT_AUDIENCE]);
        decode::<JwtClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!(error = %e, "JWT verification failed");
                GatewayError::Unauthenticated
            })
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get("Authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}

fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("X-API-Key").and_then(|h| h.to_str().ok()) {
        return Some(key);
    }
    headers.get("Authorization")?.to_str().ok()?.strip_prefix("ApiKey ")
}

/// Resolves a principal from request headers. Anonymous is always a valid
/// outcome for routes that allow it (`POST /tool/...`, `GET /mcp/sse`); the
/// caller decides whether anonymous access is acceptable.
pub async fn resolve_principal(config: &ConfigStore, headers: &HeaderMap) -> Result<Principal, GatewayError> {
    if let Some(token) = extract_bearer(headers) {
        let jwt = JwtManager::new(session_secret());
        let claims = jwt.verify(token)?;
        let user = config.get_user(&claims.sub).await?.ok_or(GatewayError::Unauthenticated)?;
        if user.disabled {
            return Err(GatewayError::PermissionDenied(format!("user '{}' is disabled", user.username)));
        }
        return Ok(Principal::User(user));
    }

    if let Some(key) = extract_api_key(headers) {
        for user in config.list_users().await {
            if user.disabled {
                continue;
            }
            if user.api_keys.iter().any(|k| k == key) {
                return Ok(Principal::User(user));
            }
        }
        return Err(GatewayError::Unauthenticated);
    }

    Ok(Principal::Anonymous)
}

/// Session tokens are signed with the same pepper `conduit-config::admin`
/// mixes into password hashes, so there's one secret to provision, not two.
pub fn session_secret() -> String {
    std::env::var(SALT_ENV).unwrap_or_else(|_| "conduit-default-pepper".to_string())
}

/// Middleware that requires an authenticated admin principal, for the
/// `/admin/*` management RPCs (spec.md §6 "Admin/public management RPCs").
pub async fn require_admin(State(state): State<Arc<AppState>>, headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let principal = resolve_principal(&state.config, &headers).await?;
    match &principal {
        Principal::User(user) if user.admin => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Principal::User(_) => Err(ApiError(GatewayError::PermissionDenied("admin privileges required".to_string()))),
        Principal::Anonymous => Err(ApiError(GatewayError::Unauthenticated)),
    }
}

/// Middleware that resolves whatever principal is present (possibly
/// anonymous) and attaches it to request extensions, for routes that route
/// differently per-caller but don't require authentication (`/tool/*`,
/// `/mcp/*`).
pub async fn attach_principal(State(state): State<Arc<AppState>>, headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let principal = resolve_principal(&state.config, &headers).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
