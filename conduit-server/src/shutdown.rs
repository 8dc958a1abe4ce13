//! Graceful shutdown, modeled on `ratchet-server`'s `startup::shutdown_signal`
//! (Ctrl+C plus SIGTERM via `tokio::select!`), extended with the gateway's
//! own coordinated teardown: refuse new SSE connections, let in-flight
//! streams end, then stop every child within its grace budget.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Per-child stop grace period; transport teardown itself is budgeted
/// separately by dropping the `SessionManager`'s senders immediately.
const CHILD_STOP_GRACE: Duration = Duration::from_secs(5);
const TRANSPORT_DRAIN_GRACE: Duration = Duration::from_secs(3);

pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

/// Tears down the transport, the idle-cleanup task, and every supervised
/// child in that order, each within its own budget (spec.md §5). Returns
/// `true` if every child stopped cleanly within its grace budget; `false`
/// tells the caller to force-exit with spec.md §6's exit code `2` instead
/// of a normal `0`.
pub async fn graceful_teardown(state: &Arc<AppState>, cleanup_token: &CancellationToken) -> bool {
    tracing::info!("shutdown: closing SSE sessions");
    state.sessions.shutdown().await;
    tokio::time::sleep(TRANSPORT_DRAIN_GRACE).await;

    tracing::info!("shutdown: stopping idle-cleanup task");
    cleanup_token.cancel();

    tracing::info!("shutdown: stopping supervised children");
    let all_stopped = state.supervisor.shutdown_all(CHILD_STOP_GRACE).await;

    if all_stopped {
        tracing::info!("shutdown complete");
    } else {
        tracing::error!("shutdown complete with errors: one or more children did not stop cleanly");
    }
    all_stopped
}
