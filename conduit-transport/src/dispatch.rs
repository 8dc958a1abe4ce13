//! JSON-RPC method dispatch table (spec.md §4.4): `initialize`,
//! `initialized`/`notifications/initialized`, `notifications/cancelled`,
//! `tools/list`, `tools/call`.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{GatewayError, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_INVALID_PARAMS, JSONRPC_INVALID_REQUEST, JSONRPC_METHOD_NOT_FOUND, JSONRPC_NOT_INITIALIZED};
use conduit_registry::{Principal, Registry};
use conduit_supervisor::Supervisor;
use serde_json::json;
use tracing::warn;

use crate::frame::SseFrame;
use crate::session::Session;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "conduit";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Dispatcher {
    supervisor: Arc<Supervisor>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(supervisor: Arc<Supervisor>, registry: Arc<Registry>) -> Self {
        Self { supervisor, registry }
    }

    /// Validates the envelope shape spec.md §4.4 requires of every POST
    /// body before dispatch is attempted: `jsonrpc == "2.0"` and a
    /// non-empty `method`.
    pub fn validate_envelope(raw: &serde_json::Value) -> Result<(), JsonRpcError> {
        let jsonrpc_ok = raw.get("jsonrpc").and_then(|v| v.as_str()) == Some("2.0");
        let method_ok = raw.get("method").and_then(|v| v.as_str()).is_some_and(|m| !m.is_empty());
        if jsonrpc_ok && method_ok {
            Ok(())
        } else {
            Err(JsonRpcError::new(JSONRPC_INVALID_REQUEST, "invalid JSON-RPC envelope"))
        }
    }

    /// Handles one envelope for `session`. Returns `None` for pure
    /// notifications (`initialized`, `notifications/cancelled`), which have
    /// no POST response. `initialize`, `tools/list`, and `tools/call`
    /// results are pushed onto the session queue in addition to being
    /// returned here, per spec.md §4.4.
    pub async fn dispatch(&self, session: &Session, request: JsonRpcRequest, principal: &Principal, deadline: Duration) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(session, request).await),
            "initialized" | "notifications/initialized" => {
                self.handle_initialized(session).await;
                None
            }
            "notifications/cancelled" => {
                self.handle_cancelled(session, request).await;
                None
            }
            "tools/list" => Some(self.handle_tools_list(session, request).await),
            "tools/call" => Some(self.handle_tools_call(session, request, principal, deadline).await),
            other => {
                warn!(method = other, "unknown JSON-RPC method");
                Some(JsonRpcResponse::failure(request.id, JsonRpcError::new(JSONRPC_METHOD_NOT_FOUND, format!("unknown method '{other}'"))))
            }
        }
    }

    async fn handle_initialize(&self, session: &Session, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
            "capabilities": {
                "tools": { "execution": true, "streaming": false },
                "roots": { "listChanged": false },
            },
        });
        // Session state stays "not initialized" until the client follows up
        // with `initialized` — `initialize` itself never flips the flag.
        let response = JsonRpcResponse::success(request.id, result.clone());
        session.push(SseFrame::Message(serde_json::to_value(&response).unwrap_or(result))).await;
        response
    }

    async fn handle_initialized(&self, session: &Session) {
        session.mark_initialized();
        let notification = json!({ "jsonrpc": "2.0", "method": "server/ready" });
        session.push(SseFrame::Message(notification)).await;
    }

    async fn handle_cancelled(&self, session: &Session, request: JsonRpcRequest) {
        if let Some(params) = request.params {
            if let Some(request_id) = params.get("requestId").cloned() {
                session.record_cancelled(request_id).await;
            }
        }
    }

    async fn handle_tools_list(&self, session: &Session, request: JsonRpcRequest) -> JsonRpcResponse {
        if !session.is_initialized() {
            return not_initialized(request.id);
        }
        let tools: Vec<serde_json::Value> = self
            .registry
            .list_tools()
            .await
            .into_iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "inputSchema": t.input_schema }))
            .collect();
        let result = json!({ "tools": tools });
        let response = JsonRpcResponse::success(request.id, result.clone());
        session.push(SseFrame::Message(serde_json::to_value(&response).unwrap_or(result))).await;
        response
    }

    async fn handle_tools_call(&self, session: &Session, request: JsonRpcRequest, principal: &Principal, deadline: Duration) -> JsonRpcResponse {
        if !session.is_initialized() {
            return not_initialized(request.id);
        }

        let params = match &request.params {
            Some(p) => p,
            None => return invalid_params(request.id, "missing params"),
        };
        let tool_name = match params.get("name").and_then(|v| v.as_str()) {
            Some(name) => name.to_string(),
            None => return invalid_params(request.id, "params.name is required"),
        };
        let arguments = params.get("arguments").cloned();

        let response = match self.call_tool(&tool_name, arguments, principal, deadline).await {
            Ok(result) => JsonRpcResponse::success(request.id.clone(), result),
            Err(e) => JsonRpcResponse::failure(request.id.clone(), JsonRpcError::from_gateway_error(&e)),
        };
        session.push(SseFrame::Message(serde_json::to_value(&response).unwrap_or(json!({})))).await;
        response
    }

    async fn call_tool(&self, tool_name: &str, arguments: Option<serde_json::Value>, principal: &Principal, deadline: Duration) -> Result<serde_json::Value, GatewayError> {
        let host = self.registry.resolve(tool_name, principal).await?;
        let params = json!({ "name": tool_name, "arguments": arguments.unwrap_or(json!({})) });
        let raw = self.supervisor.invoke(&host, "tools/call", Some(params), deadline).await?;
        Ok(json!({
            "content": raw.get("content").cloned().unwrap_or(json!([])),
            "isError": raw.get("isError").cloned().unwrap_or(json!(false)),
        }))
    }
}

fn not_initialized(id: Option<serde_json::Value>) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, JsonRpcError::new(JSONRPC_NOT_INITIALIZED, "client not initialized"))
}

fn invalid_params(id: Option<serde_json::Value>, message: &str) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, JsonRpcError::new(JSONRPC_INVALID_PARAMS, message))
}
