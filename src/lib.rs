//! Event-driven TCP server core.
//!
//! A single reactor thread multiplexes many client connections over an
//! epoll-style readiness poller, pairing each connection with non-blocking
//! buffered I/O and a deadline-ordered idle reaper, and handing protocol
//! work to a bounded pool of worker threads.
//!
//! # Architecture
//!
//! - **Server**: the reactor — owns the listening socket, the poller, the
//!   connection table and the timer heap; runs the event loop
//! - **Buffer**: growable per-connection byte buffer with read/write cursors
//!   and vectored socket I/O
//! - **TimerHeap**: min-heap of idle deadlines supporting arbitrary
//!   reschedule and cancel
//! - **ThreadPool**: fixed workers draining a bounded FIFO queue of closures
//! - **Poller**: thin capability-set wrapper over the OS readiness facility
//! - **ResourcePool**: bounded checkout pool of external handles for the
//!   protocol layer
//!
//! Protocol semantics stay outside the core: implement [`Protocol`] and hand
//! a factory for it to [`Server::new`].

mod buffer;
mod config;
mod error;
mod poller;
mod pool;
mod resource;
mod server;
mod timer;

pub use buffer::Buffer;
pub use config::{ServerConfig, Trigger};
pub use error::{AcquireError, ServerError, SubmitError};
pub use pool::ThreadPool;
pub use resource::{Pooled, ResourcePool};
pub use server::{Protocol, Server, ServerHandle};
pub use timer::TimerHeap;
