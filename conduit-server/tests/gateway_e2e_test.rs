//! End-to-end scenarios from spec.md §8, driven through the axum `Router`
//! with `tower::ServiceExt::oneshot`, following the teacher's
//! `tests/error_handling_cross_api_test.rs` style of hitting handlers
//! through a real `Router` rather than calling them as plain functions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use conduit_config::{hash_password, ConfigStore};
use conduit_core::{FilterPolicy, ServerSpec, SystemClock, UserRecord};
use conduit_registry::{PrivateInstanceManager, Registry};
use conduit_server::{build_router, AppState};
use conduit_supervisor::Supervisor;
use conduit_transport::{Dispatcher, SessionManager};
use serde_json::{json, Value};
use tower::ServiceExt;

fn fixture_path() -> String {
    env!("CARGO_BIN_EXE_conduit-echo-mcp-fixture-server").to_string()
}

fn echo_spec(name: &str) -> ServerSpec {
    ServerSpec {
        name: name.to_string(),
        command: fixture_path(),
        args: vec![],
        env: HashMap::new(),
        description: None,
        disabled: false,
    }
}

async fn test_state(dir: &std::path::Path) -> Arc<AppState> {
    let config = Arc::new(ConfigStore::load(dir).await.unwrap());
    let clock: Arc<dyn conduit_core::Clock> = Arc::new(SystemClock);
    let supervisor = Arc::new(Supervisor::new(config.clone(), clock.clone(), conduit_supervisor::DEFAULT_STREAM_LIMIT, FilterPolicy::default()));
    let private = Arc::new(PrivateInstanceManager::new(supervisor.clone(), clock.clone()));
    let registry = Arc::new(Registry::new(supervisor.clone(), config.clone(), private.clone()));
    let sessions = Arc::new(SessionManager::new());
    let dispatcher = Arc::new(Dispatcher::new(supervisor.clone(), registry.clone()));
    Arc::new(AppState {
        config,
        supervisor,
        registry,
        private,
        sessions,
        dispatcher,
        clock,
        invoke_timeout: Duration::from_secs(5),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn admin_token(state: &Arc<AppState>) -> String {
    let app = build_router(state.clone());
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({"username": "admin", "password": "admin"}).to_string()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn start_list_and_call_a_tool() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let token = admin_token(&state).await;
    let app = build_router(state.clone());

    let add = Request::builder()
        .method("POST")
        .uri("/admin/mcpserver")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&echo_spec("echo")).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(add).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["tool_count"], 1);

    let list = Request::builder()
        .uri("/admin/mcpservers")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(list).await.unwrap();
    let body = body_json(response).await;
    let servers = body["servers"].as_array().unwrap();
    assert!(servers.iter().any(|s| s["name"] == "echo" && s["status"] == "running"));

    let call = Request::builder()
        .method("POST")
        .uri("/tool/echo/echo")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "hi"}).to_string()))
        .unwrap();
    let response = app.oneshot(call).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["content"][0]["text"], "hi");
}

#[tokio::test]
async fn restart_preserves_tool_count() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let token = admin_token(&state).await;
    let app = build_router(state.clone());

    let add = Request::builder()
        .method("POST")
        .uri("/admin/mcpserver")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&echo_spec("echo")).unwrap()))
        .unwrap();
    let body = body_json(app.clone().oneshot(add).await.unwrap()).await;
    let before = body["tool_count"].clone();

    let restart = Request::builder()
        .method("POST")
        .uri("/admin/mcpserver/echo/restart")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(restart).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tool_count"], before);
}

#[tokio::test]
async fn delete_removes_tool_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let token = admin_token(&state).await;
    let app = build_router(state.clone());

    let add = Request::builder()
        .method("POST")
        .uri("/admin/mcpserver")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&echo_spec("echo")).unwrap()))
        .unwrap();
    app.clone().oneshot(add).await.unwrap();

    let delete = Request::builder()
        .method("DELETE")
        .uri("/admin/mcpserver/echo")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let call = Request::builder()
        .method("POST")
        .uri("/tool/echo/echo")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "hi"}).to_string()))
        .unwrap();
    let response = app.oneshot(call).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_unknown_server_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let token = admin_token(&state).await;
    let app = build_router(state.clone());

    let delete = Request::builder()
        .method("DELETE")
        .uri("/admin/mcpserver/nope")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_admin_cannot_reach_admin_routes() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let app = build_router(state.clone());

    let list = Request::builder().uri("/admin/mcpservers").body(Body::empty()).unwrap();
    let response = app.oneshot(list).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn private_instance_materializes_on_user_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    state.supervisor.add_and_start(echo_spec("calculator"), None).await.unwrap();

    let mut donald = UserRecord {
        username: "donald".to_string(),
        hashed_password: hash_password("hunter2").unwrap(),
        admin: false,
        disabled: false,
        api_keys: vec![],
        env: HashMap::new(),
        mcp_servers: HashMap::new(),
        server_timeouts: HashMap::new(),
        server_timeout: None,
    };
    donald.env.insert("CALCULATOR_MODE".to_string(), "scientific".to_string());
    state.config.put_user(donald).await.unwrap();

    let app = build_router(state.clone());
    let login = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({"username": "donald", "password": "hunter2"}).to_string()))
        .unwrap();
    let body = body_json(app.clone().oneshot(login).await.unwrap()).await;
    let token = body["token"].as_str().unwrap().to_string();

    let call = Request::builder()
        .method("POST")
        .uri("/tool/calculator/echo")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(json!({"text": "hi"}).to_string()))
        .unwrap();
    let response = app.oneshot(call).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let listed = state.private.list_for_user("donald").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].spec.env.get("CALCULATOR_MODE"), Some(&"scientific".to_string()));
}

#[tokio::test]
async fn sse_stream_opens_with_endpoint_event_first() {
    use http_body::Body as _;

    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let app = build_router(state.clone());

    let request = Request::builder().uri("/mcp/sse").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), std::future::poll_fn(|cx| std::pin::Pin::new(&mut body).poll_frame(cx)))
        .await
        .expect("timed out waiting for the first SSE frame")
        .expect("stream ended before any frame")
        .expect("frame error");
    let data = frame.into_data().expect("first frame should carry data, not trailers");
    let text = String::from_utf8(data.to_vec()).unwrap();
    assert!(text.starts_with("event: endpoint"), "unexpected first frame: {text}");
    assert!(text.contains("data: /mcp/message?session_id="));
}

#[tokio::test]
async fn tools_call_before_initialized_is_rejected_over_post() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let app = build_router(state.clone());

    let (session, _rx) = state.sessions.open(None).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/mcp/message?session_id={}", session.id))
        .header("content-type", "application/json")
        .body(Body::from(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "echo"}}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK); // JSON-RPC errors ride a 200 envelope
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32002);
}
