//! Shared application state threaded through every handler via axum's
//! `State` extractor — dependency injection all the way down, per
//! SPEC_FULL's re-architecture note against singletons.

use std::sync::Arc;
use std::time::Duration;

use conduit_config::ConfigStore;
use conduit_core::Clock;
use conduit_registry::{PrivateInstanceManager, Registry};
use conduit_supervisor::Supervisor;
use conduit_transport::{Dispatcher, SessionManager};

pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<Registry>,
    pub private: Arc<PrivateInstanceManager>,
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub clock: Arc<dyn Clock>,
    pub invoke_timeout: Duration,
}
