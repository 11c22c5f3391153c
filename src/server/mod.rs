//! Event-loop orchestration.
//!
//! - [`core`]: the reactor itself — accept, dispatch, close, shutdown
//! - [`conn`]: per-connection state and the [`Protocol`] collaborator trait
//! - [`socket`]: listening-socket setup and accept helpers

pub mod conn;
pub mod core;
pub(crate) mod socket;

pub use self::conn::Protocol;
pub use self::core::{Server, ServerHandle};
