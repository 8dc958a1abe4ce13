//! Liveness probe; unauthenticated, constant-time (spec.md §6).

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
