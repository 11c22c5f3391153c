//! Readiness-notification multiplexer.
//!
//! Thin capability-set interface over the OS facility: register, modify and
//! remove a descriptor's interest set, then wait for `(descriptor, mask)`
//! pairs. The event loop depends only on [`Interest`] and [`Ready`]; the
//! backend is selected per platform. Linux uses epoll with an eventfd wakeup
//! channel so other threads can interrupt a blocking wait.

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) use epoll::{EpollPoller as Poller, Waker};

/// Interest set for one registered descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Interest {
    pub read: bool,
    pub write: bool,
    /// Edge-triggered: one notification per state transition, the handler
    /// must drain until would-block.
    pub edge: bool,
    /// One event per arming; the descriptor is muted until re-armed via
    /// `modify`.
    pub oneshot: bool,
}

impl Interest {
    pub(crate) fn read() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub(crate) fn write() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub(crate) fn edge(mut self, edge: bool) -> Self {
        self.edge = edge;
        self
    }

    pub(crate) fn oneshot(mut self, oneshot: bool) -> Self {
        self.oneshot = oneshot;
        self
    }
}

/// One ready descriptor with its decoded event mask.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Ready {
    pub fd: std::os::unix::io::RawFd,
    pub readable: bool,
    pub writable: bool,
    /// Peer closed its end (hangup or half-close).
    pub closed: bool,
    pub error: bool,
}
