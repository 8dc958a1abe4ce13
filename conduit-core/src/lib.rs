//! Shared types and error taxonomy for the Conduit MCP gateway.
//!
//! This crate has no I/O of its own: it is the vocabulary every other
//! `conduit-*` crate shares, so that `conduit-supervisor`,
//! `conduit-registry`, and `conduit-transport` never need to depend on one
//! another just to exchange a `ServerSpec` or a `GatewayError`.

pub mod clock;
pub mod error;
pub mod jsonrpc;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{GatewayError, GatewayResult};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use types::{
    apply_filters, collides_with_private_naming, ChildStatus, FilterPolicy, ServerSpec, ToolDescriptor,
    UserRecord, UserServerOverride, PRIVATE_INSTANCE_SEPARATOR,
};
