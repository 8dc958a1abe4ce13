//! SSE session transport and JSON-RPC method dispatch (spec.md §4.4).

mod dispatch;
mod frame;
mod session;

pub use dispatch::{Dispatcher, PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};
pub use frame::SseFrame;
pub use session::{Session, SessionManager, SESSION_QUEUE_CAPACITY};
