use super::{Interest, Ready};

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

const MAX_EVENTS: usize = 1024;

/// Owned eventfd used to interrupt a blocking `epoll_wait` from another
/// thread.
struct WakeFd(RawFd);

impl Drop for WakeFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

/// Cloneable handle that wakes the poller's wait call.
///
/// Safe to call from pool threads and shutdown handles; the poller drains the
/// underlying eventfd internally and never reports it as a ready descriptor.
#[derive(Clone)]
pub(crate) struct Waker {
    fd: Arc<WakeFd>,
}

impl Waker {
    pub(crate) fn wake(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.fd.0, &one as *const u64 as *const _, 8);
        }
    }
}

/// epoll-backed readiness multiplexer.
pub(crate) struct EpollPoller {
    epoll_fd: RawFd,
    wake: Arc<WakeFd>,
    events: Vec<libc::epoll_event>,
    ready: Vec<Ready>,
}

impl EpollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if wake_fd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll_fd) };
            return Err(err);
        }

        let poller = Self {
            epoll_fd,
            wake: Arc::new(WakeFd(wake_fd)),
            events: vec![empty_event(); MAX_EVENTS],
            ready: Vec::with_capacity(MAX_EVENTS),
        };
        poller.ctl(libc::EPOLL_CTL_ADD, wake_fd, libc::EPOLLIN as u32)?;

        Ok(poller)
    }

    pub(crate) fn waker(&self) -> Waker {
        Waker {
            fd: self.wake.clone(),
        }
    }

    /// Adds `fd` to the epoll set with the given interest.
    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, mask(interest))
    }

    /// Replaces `fd`'s interest set. Also re-arms a oneshot registration.
    pub(crate) fn modify(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, mask(interest))
    }

    /// Removes `fd` from the epoll set.
    pub(crate) fn remove(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, 0)
    }

    /// Blocks until at least one descriptor is ready, the timeout elapses, or
    /// a [`Waker`] fires. EINTR is retried transparently.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<&[Ready]> {
        // Round up so a sub-millisecond remainder does not spin the loop.
        let timeout_ms = match timeout {
            Some(d) => d
                .as_nanos()
                .div_ceil(1_000_000)
                .min(i32::MAX as u128) as i32,
            None => -1,
        };

        let n = loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.epoll_fd,
                    self.events.as_mut_ptr(),
                    MAX_EVENTS as i32,
                    timeout_ms,
                )
            };
            if n >= 0 {
                break n as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        self.ready.clear();
        for event in &self.events[..n] {
            let fd = event.u64 as RawFd;
            if fd == self.wake.0 {
                self.drain_wake();
                continue;
            }

            let bits = event.events;
            self.ready.push(Ready {
                fd,
                readable: bits & libc::EPOLLIN as u32 != 0,
                writable: bits & libc::EPOLLOUT as u32 != 0,
                closed: bits & (libc::EPOLLRDHUP | libc::EPOLLHUP) as u32 != 0,
                error: bits & libc::EPOLLERR as u32 != 0,
            });
        }

        Ok(&self.ready)
    }

    fn drain_wake(&self) {
        let mut counter: u64 = 0;
        unsafe {
            libc::read(self.wake.0, &mut counter as *mut u64 as *mut _, 8);
        }
    }

    fn ctl(&self, op: i32, fd: RawFd, events: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll_fd) };
    }
}

fn empty_event() -> libc::epoll_event {
    libc::epoll_event { events: 0, u64: 0 }
}

fn mask(interest: Interest) -> u32 {
    // Peer half-close is always of interest for client sockets.
    let mut bits = libc::EPOLLRDHUP as u32;
    if interest.read {
        bits |= libc::EPOLLIN as u32;
    }
    if interest.write {
        bits |= libc::EPOLLOUT as u32;
    }
    if interest.edge {
        bits |= libc::EPOLLET as u32;
    }
    if interest.oneshot {
        bits |= libc::EPOLLONESHOT as u32;
    }
    bits
}
