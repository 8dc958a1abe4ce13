//! `Session`: one logical client connecting over SSE + POST (spec.md §4.4).
//! The SSE generator is the sole consumer of its queue; the POST handler and
//! the dispatcher are the only producers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::SseFrame;

/// Bounded so a slow or gone SSE consumer cannot grow memory unboundedly;
/// a full queue drops the new frame with a warning rather than blocking the
/// caller (the POST handler would otherwise stall an unrelated request).
pub const SESSION_QUEUE_CAPACITY: usize = 256;

pub struct Session {
    pub id: Uuid,
    tx: mpsc::Sender<SseFrame>,
    initialized: AtomicBool,
    /// Cancellation is advisory only (spec.md §5): recorded for
    /// observability, never used to interrupt an in-flight stdio call.
    cancelled: tokio::sync::Mutex<Vec<serde_json::Value>>,
}

impl Session {
    fn new(id: Uuid) -> (Arc<Self>, mpsc::Receiver<SseFrame>) {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        (
            Arc::new(Self {
                id,
                tx,
                initialized: AtomicBool::new(false),
                cancelled: tokio::sync::Mutex::new(Vec::new()),
            }),
            rx,
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub async fn record_cancelled(&self, request_id: serde_json::Value) {
        self.cancelled.lock().await.push(request_id);
    }

    pub async fn cancelled_ids(&self) -> Vec<serde_json::Value> {
        self.cancelled.lock().await.clone()
    }

    /// Best-effort push: a dropped frame (queue full or consumer gone) is
    /// the transport's problem, not the caller's.
    pub async fn push(&self, frame: SseFrame) {
        if self.tx.try_send(frame).is_err() {
            warn!(session = %self.id, "session queue full or closed, dropping frame");
        }
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    shutting_down: AtomicBool,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session, normalizing or generating `requested_id` per
    /// spec.md §4.4. Returns `None` once the transport is shutting down —
    /// callers must refuse the connection.
    pub async fn open(&self, requested_id: Option<Uuid>) -> Option<(Arc<Session>, mpsc::Receiver<SseFrame>)> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return None;
        }
        let id = requested_id.unwrap_or_else(Uuid::new_v4);
        let (session, rx) = Session::new(id);
        // The first frame on a new stream is always `endpoint` (spec.md
        // §4.4, invariant 2 in §8); pushing it here, onto the queue itself,
        // makes the session's own FIFO ordering the thing that guarantees
        // it instead of a parallel mechanism at the HTTP layer.
        session.push(SseFrame::Endpoint(format!("/mcp/message?session_id={id}"))).await;
        self.sessions.write().await.insert(id, session.clone());
        info!(session = %id, "session opened");
        Some((session, rx))
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Marks the session closed (client disconnect, internal error, or
    /// process shutdown) and removes it; the queue's `Receiver` half, once
    /// dropped by the SSE generator, ends the stream.
    pub async fn close(&self, id: Uuid) {
        if self.sessions.write().await.remove(&id).is_some() {
            info!(session = %id, "session closed");
        }
    }

    /// Refuses new connections and drops every tracked session, which in
    /// turn drops every sender half and lets in-flight SSE streams end.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.sessions.write().await.clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_generates_id_when_missing() {
        let manager = SessionManager::new();
        let (session, _rx) = manager.open(None).await.unwrap();
        assert!(manager.get(session.id).await.is_some());
    }

    #[tokio::test]
    async fn open_normalizes_requested_id() {
        let manager = SessionManager::new();
        let requested = Uuid::new_v4();
        let (session, _rx) = manager.open(Some(requested)).await.unwrap();
        assert_eq!(session.id, requested);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_connections() {
        let manager = SessionManager::new();
        manager.shutdown().await;
        assert!(manager.open(None).await.is_none());
    }

    #[tokio::test]
    async fn close_removes_session() {
        let manager = SessionManager::new();
        let (session, _rx) = manager.open(None).await.unwrap();
        manager.close(session.id).await;
        assert!(manager.get(session.id).await.is_none());
    }
}
