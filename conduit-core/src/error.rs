//! Error taxonomy shared by every Conduit crate.
//!
//! The variants here are the ones surfaced up to callers per the gateway's
//! error taxonomy: `NotFound`, `AlreadyExists`, `InvalidArgument`,
//! `Unauthenticated`, `PermissionDenied`, `ServerUnavailable`, `Timeout`, and
//! `Internal`. HTTP handlers and the JSON-RPC dispatcher each map these to
//! their own wire codes; see `to_http_status` and `to_jsonrpc_code` below.

use thiserror::Error;

/// Result type used throughout the gateway core.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::ServerUnavailable(what.into())
    }

    pub fn internal(what: impl Into<String>) -> Self {
        Self::Internal(what.into())
    }

    /// JSON-RPC 2.0 error code for this taxonomy entry, per spec.md §7.
    pub fn to_jsonrpc_code(&self) -> i64 {
        match self {
            GatewayError::NotFound(_) => -32601,
            GatewayError::AlreadyExists(_) => -32600,
            GatewayError::InvalidArgument(_) => -32602,
            GatewayError::Unauthenticated | GatewayError::PermissionDenied(_) => -32603,
            GatewayError::ServerUnavailable(_) => -32603,
            GatewayError::Timeout(_) => -32603,
            GatewayError::Internal(_) => -32603,
        }
    }

    /// HTTP status code for this taxonomy entry, per spec.md §7's
    /// `404`/`400`/`401`/`403`/`500`/`504` mapping. `conduit-server`
    /// converts this into an `axum::http::StatusCode`.
    pub fn to_http_status(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::AlreadyExists(_) | GatewayError::InvalidArgument(_) => 400,
            GatewayError::Unauthenticated => 401,
            GatewayError::PermissionDenied(_) => 403,
            GatewayError::Timeout(_) => 504,
            GatewayError::ServerUnavailable(_) | GatewayError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("json error: {e}"))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(format!("io error: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for GatewayError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GatewayError::Timeout(std::time::Duration::default())
    }
}

/// Client-not-initialized error, a fixed JSON-RPC code outside the taxonomy
/// above (spec.md §4.4, invariant 3 in §8).
pub const JSONRPC_NOT_INITIALIZED: i64 = -32002;
pub const JSONRPC_INVALID_REQUEST: i64 = -32600;
pub const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;
pub const JSONRPC_INVALID_PARAMS: i64 = -32602;
pub const JSONRPC_INTERNAL_ERROR: i64 = -32603;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_method_not_found() {
        assert_eq!(GatewayError::not_found("x").to_jsonrpc_code(), -32601);
    }

    #[test]
    fn already_exists_maps_to_invalid_request() {
        assert_eq!(GatewayError::already_exists("x").to_jsonrpc_code(), -32600);
    }

    #[test]
    fn not_found_maps_to_http_404() {
        assert_eq!(GatewayError::not_found("x").to_http_status(), 404);
    }

    #[test]
    fn timeout_maps_to_http_504() {
        assert_eq!(GatewayError::Timeout(std::time::Duration::from_secs(1)).to_http_status(), 504);
    }
}
