//! Structured logging init, modeled on `ratchet-logging`'s
//! `init_simple_tracing`: an `EnvFilter` seeded from `RUST_LOG` (falling
//! back to `info`), installed with `try_init` so a second call (tests
//! spinning up multiple servers in one process) never panics.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(env_filter).try_init().is_err() {
        tracing::debug!("global tracing subscriber already initialized, skipping");
    }
}
