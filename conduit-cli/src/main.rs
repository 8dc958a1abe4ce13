//! Binary entrypoint: parses CLI args/env, wires every `conduit-*` crate
//! together into one `AppState`, and runs the axum server until a shutdown
//! signal arrives, following `ratchet-server`'s `main.rs` load-config →
//! build-server → run shape.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use conduit_config::ConfigStore;
use conduit_core::{Clock, FilterPolicy, SystemClock};
use conduit_registry::{PrivateInstanceManager, Registry};
use conduit_server::{build_router, graceful_teardown, telemetry, wait_for_signal, AppState};
use conduit_supervisor::Supervisor;
use conduit_transport::{Dispatcher, SessionManager};
use tokio_util::sync::CancellationToken;

use cli::{parse_name_list, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => Ok(()),
        // Startup succeeded and the server ran, but teardown couldn't stop
        // every child within its grace budget (spec.md §6 exit code `2`,
        // "forced exit on shutdown error").
        Ok(false) => std::process::exit(2),
        Err(e) => {
            tracing::error!(error = %e, "conduit exited with an error");
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(true)` on a clean shutdown, `Ok(false)` if graceful teardown
/// could not stop every child in time, `Err` on a startup failure.
async fn run(cli: Cli) -> Result<bool> {
    let config = Arc::new(ConfigStore::load(&cli.config_storage_path).await.context("failed to load ConfigStore")?);

    let env_filter = FilterPolicy {
        whitelist: parse_name_list(&cli.tools_whitelist),
        blacklist: parse_name_list(&cli.tools_blacklist),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let supervisor = Arc::new(Supervisor::new(config.clone(), clock.clone(), cli.subprocess_stream_limit, env_filter));
    supervisor.load_from_config().await.context("failed to load servers from config")?;

    let private = Arc::new(PrivateInstanceManager::new(supervisor.clone(), clock.clone()));
    let registry = Arc::new(Registry::new(supervisor.clone(), config.clone(), private.clone()));
    let sessions = Arc::new(SessionManager::new());
    let dispatcher = Arc::new(Dispatcher::new(supervisor.clone(), registry.clone()));

    let state = Arc::new(AppState {
        config: config.clone(),
        supervisor,
        registry,
        private: private.clone(),
        sessions,
        dispatcher,
        clock: clock.clone(),
        invoke_timeout: Duration::from_secs(cli.invoke_timeout),
    });

    let cleanup_token = CancellationToken::new();
    let cleanup_interval = Duration::from_secs(cli.private_server_cleanup_interval);
    PrivateInstanceManager::spawn_cleanup_task(private, config, clock, cleanup_interval, cleanup_token.clone());

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&cli.bind).await.with_context(|| format!("failed to bind {}", cli.bind))?;
    tracing::info!(bind = %cli.bind, config = %cli.config_storage_path.display(), "conduit gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(wait_for_signal()).await.context("server error")?;

    Ok(graceful_teardown(&state, &cleanup_token).await)
}
