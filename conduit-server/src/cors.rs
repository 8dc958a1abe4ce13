//! CORS layer, modeled on `ratchet-web`'s `middleware::cors` module: allow a
//! configured origin list, or `Any` with a loud warning when none is set.

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

const ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";

pub fn cors_layer() -> CorsLayer {
    let configured = std::env::var(ORIGINS_ENV).unwrap_or_default();
    let origins: Vec<&str> = configured.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

    let base = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::DELETE]).allow_headers(Any);

    if origins.is_empty() {
        tracing::warn!("{ORIGINS_ENV} not set, allowing any origin — restrict this in production");
        return base.allow_origin(Any);
    }

    let parsed: Result<Vec<HeaderValue>, _> = origins.iter().map(|o| o.parse::<HeaderValue>()).collect();
    match parsed {
        Ok(values) => base.allow_origin(values),
        Err(e) => {
            tracing::error!(error = %e, "invalid {ORIGINS_ENV}, falling back to Any");
            base.allow_origin(Any)
        }
    }
}
