//! Axum HTTP application wiring for the gateway: router composition, auth,
//! CORS, telemetry init, and the graceful-shutdown sequence. Orbits around
//! a `conduit_registry::Registry`/`conduit_supervisor::Supervisor` pair the
//! same way `ratchet-server::startup::Server` orbits its `ServiceContainer`.

mod auth;
mod cors;
mod error;
mod handlers;
mod router;
mod shutdown;
mod state;
pub mod telemetry;

pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use shutdown::{graceful_teardown, wait_for_signal};
pub use state::AppState;
