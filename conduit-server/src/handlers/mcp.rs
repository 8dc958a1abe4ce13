//! `GET /mcp/sse` and `POST /mcp/message` — the SSE session transport's
//! HTTP surface (spec.md §4.4/§6). Streaming itself follows the
//! `axum::response::sse::{Event, Sse, KeepAlive}` pattern `axum-mcp`'s
//! `server::handler::handle_standard_sse` uses.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use conduit_core::{JsonRpcError, JsonRpcRequest, JSONRPC_INVALID_PARAMS};
use conduit_registry::Principal;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::state::AppState;

/// Keep-alive comments fire after this much queue idle time (spec.md §4.4).
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
pub struct SseQuery {
    client_id: Option<String>,
}

pub async fn sse_stream(State(state): State<Arc<AppState>>, Query(query): Query<SseQuery>) -> impl IntoResponse {
    let requested_id = query.client_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());
    let opened = state.sessions.open(requested_id).await;

    let Some((_session, rx)) = opened else {
        return (axum::http::StatusCode::SERVICE_UNAVAILABLE, "transport is shutting down").into_response();
    };

    // `SessionManager::open` already pushed the `endpoint` frame onto this
    // session's queue before returning it, so it's always the first item
    // this stream yields — one mechanism (the queue's own FIFO order)
    // guarantees the ordering instead of two.
    let stream = ReceiverStream::new(rx).map(|frame| {
        let event = match frame {
            conduit_transport::SseFrame::Endpoint(path) => Event::default().event("endpoint").data(path),
            conduit_transport::SseFrame::Message(value) => Event::default().event("message").data(value.to_string()),
        };
        Ok::<Event, Infallible>(event)
    });

    // Disconnected clients leave a stale `SessionManager` entry behind —
    // there's no on-drop hook on `Sse` to call `close()` from. It's reaped
    // on the next `shutdown()` sweep, or found dead by a subsequent
    // `push()`'s failed `try_send`.
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive"))
        .into_response()
}

#[derive(Deserialize)]
pub struct MessageQuery {
    session_id: Option<String>,
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MessageQuery>,
    Json(raw): Json<Value>,
) -> Json<Value> {
    let response = handle_message(&state, &principal, query, raw).await;
    Json(serde_json::to_value(response).unwrap_or(serde_json::json!({})))
}

async fn handle_message(state: &AppState, principal: &Principal, query: MessageQuery, raw: Value) -> conduit_core::JsonRpcResponse {
    let id = raw.get("id").cloned();

    let session_id = match query.session_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()) {
        Some(id) => id,
        None => return conduit_core::JsonRpcResponse::failure(id, JsonRpcError::new(JSONRPC_INVALID_PARAMS, "missing or invalid session_id")),
    };

    let Some(session) = state.sessions.get(session_id).await else {
        return conduit_core::JsonRpcResponse::failure(id, JsonRpcError::new(JSONRPC_INVALID_PARAMS, "unknown session_id"));
    };

    if let Err(err) = conduit_transport::Dispatcher::validate_envelope(&raw) {
        return conduit_core::JsonRpcResponse::failure(id, err);
    }

    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(_) => return conduit_core::JsonRpcResponse::failure(id, JsonRpcError::new(conduit_core::JSONRPC_INVALID_REQUEST, "malformed JSON-RPC envelope")),
    };

    match state.dispatcher.dispatch(&session, request.clone(), principal, state.invoke_timeout).await {
        Some(response) => response,
        None => conduit_core::JsonRpcResponse::success(request.id, serde_json::json!({ "acknowledged": true })),
    }
}
