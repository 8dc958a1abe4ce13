//! Frames pushed onto a session's queue. `conduit-server` turns these into
//! actual `axum::response::sse::Event`s — this crate stays HTTP-framework
//! agnostic, the same separation `axum-mcp` draws between its `McpTransport`
//! trait and its axum-specific `server::handler` module.

#[derive(Debug, Clone)]
pub enum SseFrame {
    /// Always the first frame on a new stream: `event: endpoint`.
    Endpoint(String),
    /// `event: message`, data is the serialized JSON-RPC envelope.
    Message(serde_json::Value),
}
