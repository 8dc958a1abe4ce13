//! HTTP-facing error type: wraps `GatewayError` and maps the taxonomy to
//! status codes per spec.md §7, following `ratchet-web`'s `WebError`
//! pattern (a `thiserror` enum with its own `IntoResponse`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conduit_core::GatewayError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub GatewayError);

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }
        let body = json!({ "error": { "code": error_code(&self.0), "message": self.0.to_string() } });
        (status, Json(body)).into_response()
    }
}

fn error_code(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::NotFound(_) => "NOT_FOUND",
        GatewayError::AlreadyExists(_) => "ALREADY_EXISTS",
        GatewayError::InvalidArgument(_) => "INVALID_ARGUMENT",
        GatewayError::Unauthenticated => "UNAUTHENTICATED",
        GatewayError::PermissionDenied(_) => "PERMISSION_DENIED",
        GatewayError::ServerUnavailable(_) => "SERVER_UNAVAILABLE",
        GatewayError::Timeout(_) => "TIMEOUT",
        GatewayError::Internal(_) => "INTERNAL",
    }
}
