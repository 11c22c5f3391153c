//! Server configuration surface.
//!
//! All knobs the event loop consumes are external inputs gathered here:
//! listen port, trigger modes, idle timeout, worker count, linger behavior
//! and capacity limits. Built fluently, after the crate's general builder
//! style.

use std::time::Duration;

/// Readiness-notification delivery mode for a socket class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Event re-fires while the condition persists.
    Level,
    /// Event fires once per transition; handlers drain until would-block.
    Edge,
}

/// Configuration consumed by [`Server`](crate::Server).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// TCP port to listen on; 0 asks the OS for an ephemeral port.
    pub port: u16,
    /// Trigger mode for the listening socket.
    pub listen_trigger: Trigger,
    /// Trigger mode for accepted client sockets.
    pub conn_trigger: Trigger,
    /// Inactivity window after which a connection is forcibly closed.
    pub idle_timeout: Duration,
    /// Worker threads for off-reactor processing; 0 processes inline.
    pub workers: usize,
    /// Maximum jobs queued in the worker pool before submit fails.
    pub max_queue: usize,
    /// Maximum simultaneously open connections; new ones past this are
    /// turned away with a busy reply.
    pub max_connections: usize,
    /// Enable SO_LINGER on the listening socket so closes flush briefly.
    pub linger: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            listen_trigger: Trigger::Edge,
            conn_trigger: Trigger::Edge,
            idle_timeout: Duration::from_secs(60),
            workers: 4,
            max_queue: 1024,
            max_connections: 4096,
            linger: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn listen_trigger(mut self, trigger: Trigger) -> Self {
        self.listen_trigger = trigger;
        self
    }

    pub fn conn_trigger(mut self, trigger: Trigger) -> Self {
        self.conn_trigger = trigger;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn linger(mut self, linger: bool) -> Self {
        self.linger = linger;
        self
    }
}
