//! `POST /tool/<server>/<tool>` — direct REST tool invocation (spec.md §6).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Path, State};
use axum::Json;
use conduit_core::GatewayError;
use conduit_registry::Principal;
use serde_json::Value;

use crate::error::ApiResult;
use crate::state::AppState;

/// Resolves which child should host the call for an explicitly-named
/// `server`: a live or materializable private instance if `principal` has
/// an override for it, otherwise the shared child by that exact name.
async fn resolve_named_server(state: &AppState, server: &str, principal: &Principal) -> Result<String, GatewayError> {
    if let Principal::User(user) = principal {
        if let Some(child) = state.private.live_private(&user.username, server).await {
            return Ok(child);
        }
        if user.has_override_for(server) {
            if let Some(spec) = state.config.get_server(server).await {
                return state.private.ensure_private(&spec, user).await;
            }
        }
    }
    Ok(server.to_string())
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((server, tool)): Path<(String, String)>,
    Json(params): Json<Value>,
) -> ApiResult<Json<Value>> {
    let host = resolve_named_server(&state, &server, &principal).await?;
    let call_params = serde_json::json!({ "name": tool, "arguments": params });
    let result = state.supervisor.invoke(&host, "tools/call", Some(call_params), state.invoke_timeout).await?;
    Ok(Json(serde_json::json!({ "result": result })))
}
