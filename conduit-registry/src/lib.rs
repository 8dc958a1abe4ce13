//! Tool registry, routing, and the private-instance manager (spec.md §4.2,
//! §4.3).

mod principal;
mod private;
mod registry;

pub use principal::Principal;
pub use private::PrivateInstanceManager;
pub use registry::Registry;
