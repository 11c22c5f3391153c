//! Per-connection state: socket, buffers and the protocol collaborator.

use crate::buffer::Buffer;

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

/// Application protocol collaborator.
///
/// The event loop knows nothing about message framing or semantics. It hands
/// the protocol the buffered input and a write buffer to stage any response
/// into, and only asks one question back: should the connection stay open?
pub trait Protocol: Send + 'static {
    /// Consumes whatever it can from `input`, stages response bytes into
    /// `output`, and returns whether the connection should persist.
    ///
    /// Runs on a pool thread (or inline on the reactor thread when the pool
    /// has no workers); it may touch only this connection's buffers, never
    /// the reactor's shared state.
    fn process(&mut self, input: &mut Buffer, output: &mut Buffer) -> bool;
}

/// One accepted client connection.
///
/// Owned by the reactor's connection table; a pool task holds it transiently
/// through an `Arc<Mutex<_>>` while processing, never two tasks at once.
pub(crate) struct Connection {
    fd: RawFd,
    peer: SocketAddr,
    read_buf: Buffer,
    write_buf: Buffer,
    protocol: Box<dyn Protocol>,
    keep_alive: bool,
    is_closing: bool,
    /// Edge-triggered registration: drain I/O until would-block.
    edge: bool,
}

impl Connection {
    pub(crate) fn new(
        fd: RawFd,
        peer: SocketAddr,
        edge: bool,
        protocol: Box<dyn Protocol>,
    ) -> Self {
        Self {
            fd,
            peer,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            protocol,
            keep_alive: true,
            is_closing: false,
            edge,
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Reads from the socket into the read buffer: once under level
    /// triggering, until would-block under edge triggering.
    ///
    /// `Ok(0)` means the peer shut down cleanly before sending anything new.
    pub(crate) fn read(&mut self) -> io::Result<usize> {
        let mut total = 0;
        loop {
            match self.read_buf.read_from(self.fd) {
                Ok(0) => {
                    if total == 0 {
                        return Ok(0);
                    }
                    // Peer closed after sending data; the hangup event will
                    // follow once this batch is processed.
                    break;
                }
                Ok(n) => {
                    total += n;
                    if !self.edge {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if total == 0 {
                        return Err(e);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Flushes the write buffer to the socket, stopping at would-block.
    /// Partial writes are expected; the caller re-arms write interest and
    /// retries on the next readiness event.
    pub(crate) fn write(&mut self) -> io::Result<usize> {
        let mut total = 0;
        while self.write_buf.readable_bytes() > 0 {
            match self.write_buf.write_to(self.fd) {
                Ok(n) => {
                    total += n;
                    if !self.edge {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if total == 0 {
                        return Err(e);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Runs the protocol over the buffered input. Returns whether response
    /// bytes are now pending in the write buffer; with no input it does
    /// nothing and reports no pending output.
    pub(crate) fn process(&mut self) -> bool {
        if self.read_buf.readable_bytes() == 0 {
            return self.write_buf.readable_bytes() > 0;
        }
        self.keep_alive = self
            .protocol
            .process(&mut self.read_buf, &mut self.write_buf);
        self.write_buf.readable_bytes() > 0
    }

    pub(crate) fn pending_output(&self) -> bool {
        self.write_buf.readable_bytes() > 0
    }

    pub(crate) fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.is_closing
    }

    /// Marks the connection closed so a pool task finishing late discards
    /// its result instead of writing into a dead connection.
    pub(crate) fn set_closing(&mut self) {
        self.is_closing = true;
    }
}
