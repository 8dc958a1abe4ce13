//! Child-process supervisor and stdio JSON-RPC client (spec.md §4.1).

mod child;
mod command_rewrite;
mod stdio_client;
mod supervisor;

pub use child::ChildInfo;
pub use command_rewrite::rewrite_uvx;
pub use supervisor::{StartOutcome, Supervisor, DEFAULT_STREAM_LIMIT};
