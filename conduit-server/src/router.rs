//! Router composition, following `ratchet-server::startup::Server::build_app`'s
//! one-router-per-concern-then-merge style.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{attach_principal, require_admin};
use crate::cors::cors_layer;
use crate::handlers::{admin, health, login, mcp, tools};
use crate::state::AppState;

// No blanket request timeout layer: `tower_http::timeout::TimeoutLayer`
// produces a boxed error axum's `Router` can't turn into a response without
// a `HandleErrorLayer`, so each call's own budget comes from
// `Supervisor::invoke`'s `deadline` argument instead.

pub fn build_router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/mcpserver", post(admin::add_server))
        .route("/mcpservers", get(admin::list_servers))
        .route("/mcpserver/{name}", delete(admin::delete_server))
        .route("/mcpserver/{name}/restart", post(admin::restart_server))
        .route("/mcpservers/restart", post(admin::restart_all))
        .route("/tools/reload", post(admin::reload_tools))
        .layer(from_fn_with_state(state.clone(), require_admin));

    let routed_tool_and_transport = Router::new()
        .route("/tool/{server}/{tool}", post(tools::call_tool))
        .route("/mcp/sse", get(mcp::sse_stream))
        .route("/mcp/message", post(mcp::post_message))
        .layer(from_fn_with_state(state.clone(), attach_principal));

    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/auth/login", post(login::login))
        .nest("/admin", admin_routes)
        .merge(routed_tool_and_transport)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
