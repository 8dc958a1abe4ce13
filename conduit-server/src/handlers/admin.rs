//! Admin/public management RPCs (spec.md §6): add, list, delete, restart,
//! restart-all, and force tool rediscovery.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use conduit_core::ServerSpec;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
struct ServerSummary {
    name: String,
    status: String,
    #[serde(rename = "toolCount")]
    tool_count: usize,
}

pub async fn add_server(State(state): State<Arc<AppState>>, Json(spec): Json<ServerSpec>) -> ApiResult<Json<Value>> {
    let outcome = state.supervisor.add_and_start(spec, None).await?;
    Ok(Json(json!({ "status": "success", "tool_count": outcome.tool_count })))
}

pub async fn list_servers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let servers: Vec<ServerSummary> = state
        .supervisor
        .list()
        .await
        .into_iter()
        .map(|info| ServerSummary {
            name: info.spec.name.clone(),
            status: info.status.to_string(),
            tool_count: info.tools.len(),
        })
        .collect();
    Json(json!({ "servers": servers }))
}

pub async fn delete_server(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    state.supervisor.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restart_server(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let outcome = state.supervisor.restart(&name).await?;
    Ok(Json(json!({ "status": "success", "tool_count": outcome.tool_count })))
}

/// `POST /admin/mcpservers/restart` — best-effort restart of every known
/// server; a single failure is logged and does not abort the rest.
pub async fn restart_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let names: Vec<String> = state.supervisor.list().await.into_iter().map(|info| info.spec.name).collect();
    let mut restarted = 0;
    for name in &names {
        match state.supervisor.restart(name).await {
            Ok(_) => restarted += 1,
            Err(e) => warn!(server = name, error = %e, "restart-all: failed to restart server"),
        }
    }
    Json(json!({ "status": "success", "restarted": restarted, "total": names.len() }))
}

/// `POST /admin/tools/reload` — forces rediscovery on every server by
/// restarting it, which re-runs `discover_tools` and refreshes the tool
/// cache (spec.md's content-hash invalidation supplement applies here too).
pub async fn reload_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    restart_all(State(state)).await
}
