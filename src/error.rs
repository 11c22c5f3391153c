//! Crate error types.
//!
//! Transient would-block conditions are not represented here: they stay
//! `std::io::Error` with `ErrorKind::WouldBlock` and never escape the event
//! loop. These types cover the failures a caller can actually act on.

use std::io;
use thiserror::Error;

/// Failure to construct or run the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket setup failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

/// Explicit rejection from [`ThreadPool::submit`](crate::ThreadPool::submit).
///
/// Surfaced instead of unbounded queue growth so the reactor can apply
/// backpressure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("task queue is full")]
    QueueFull,

    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("pool has no worker threads")]
    NoWorkers,
}

/// Failure to check a handle out of a [`ResourcePool`](crate::ResourcePool).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("no handle became available within the timeout")]
    Timeout,

    #[error("pool is shutting down")]
    Closed,
}
