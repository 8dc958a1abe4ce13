//! CLI argument definitions, modeled on `ratchet-cli`'s `Cli`/`Commands`
//! split: global flags on the top-level struct, env-backed defaults via
//! `clap`'s `env` attribute so the documented environment variables
//! (spec.md §6) double as CLI overrides.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "conduit", author, version, about = "Multi-tenant MCP supervisor and gateway", long_about = None)]
pub struct Cli {
    /// Root directory of the ConfigStore (spec.md `CONFIG_STORAGE_PATH`).
    #[arg(long, value_name = "PATH", env = "CONFIG_STORAGE_PATH", default_value = "./conduit-data")]
    pub config_storage_path: PathBuf,

    /// HTTP bind address.
    #[arg(long, value_name = "HOST:PORT", env = "CONDUIT_BIND_ADDRESS", default_value = "0.0.0.0:8099")]
    pub bind: String,

    /// Child stdio line-buffer size in bytes (spec.md `SUBPROCESS_STREAM_LIMIT`).
    #[arg(long, value_name = "BYTES", env = "SUBPROCESS_STREAM_LIMIT", default_value_t = conduit_supervisor::DEFAULT_STREAM_LIMIT)]
    pub subprocess_stream_limit: usize,

    /// Idle-GC sweep interval in seconds (spec.md `PRIVATE_SERVER_CLEANUP_INTERVAL`).
    #[arg(long, value_name = "SECONDS", env = "PRIVATE_SERVER_CLEANUP_INTERVAL", default_value_t = 300)]
    pub private_server_cleanup_interval: u64,

    /// Per-call deadline in seconds for `Invoke` (not named directly in
    /// spec.md, which leaves the caller's deadline unspecified; this is the
    /// gateway-wide default).
    #[arg(long, value_name = "SECONDS", env = "CONDUIT_INVOKE_TIMEOUT", default_value_t = 30)]
    pub invoke_timeout: u64,

    /// Comma-separated tool whitelist (spec.md `TOOLS_WHITELIST`, highest precedence).
    #[arg(long, value_name = "NAMES", env = "TOOLS_WHITELIST")]
    pub tools_whitelist: Option<String>,

    /// Comma-separated tool blacklist (spec.md `TOOLS_BLACKLIST`, highest precedence).
    #[arg(long, value_name = "NAMES", env = "TOOLS_BLACKLIST")]
    pub tools_blacklist: Option<String>,
}

/// Splits a comma-separated env value into a trimmed, non-empty name list.
pub fn parse_name_list(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
