//! Per-connection growable byte buffer with separate read and write cursors.
//!
//! The backing storage is split into three regions:
//!
//! ```text
//! | prependable          | readable                | writable              |
//! 0                  read_pos                  write_pos             capacity
//! ```
//!
//! Bytes are appended at `write_pos` and consumed at `read_pos`. Space in
//! front of `read_pos` is reclaimed by compaction before the storage is ever
//! grown, which bounds memory use under steady-state traffic.

use std::io;
use std::os::unix::io::RawFd;

/// Stack scratch area used as the overflow half of the vectored read.
///
/// A large per-connection buffer would waste memory at high connection
/// counts, so [`Buffer::read_from`] reads into the writable region and this
/// on-stack area in a single `readv`, then appends any overflow.
const SCRATCH_LEN: usize = 64 * 1024;

const INITIAL_CAPACITY: usize = 1024;

/// Growable byte buffer with distinct read/write cursors.
///
/// Invariant: `0 <= read_pos <= write_pos <= capacity`. Callers only ever see
/// the readable region as a slice via [`peek`](Self::peek); raw offsets stay
/// private.
pub struct Buffer {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Buffer {
    /// Creates a buffer with the default initial capacity (1 KiB).
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates a buffer whose backing storage starts at `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Bytes available to read: `write_pos - read_pos`.
    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Bytes available to write without growing: `capacity - write_pos`.
    pub fn writable_bytes(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    /// Bytes in front of the read cursor, reclaimable by compaction.
    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    /// The readable region.
    pub fn peek(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// Guarantees `writable_bytes() >= len` afterwards.
    ///
    /// Prefers compacting (moving the readable bytes to offset 0) when the
    /// writable and prependable regions together already hold `len` bytes;
    /// grows the backing storage otherwise. Growth never shrinks.
    pub fn ensure_writable(&mut self, len: usize) {
        if len > self.writable_bytes() {
            self.make_space(len);
        }
        debug_assert!(len <= self.writable_bytes());
    }

    /// Copies `data` into the writable region and advances the write cursor.
    ///
    /// A zero-length append is a no-op.
    pub fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.ensure_writable(data.len());
        self.storage[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
    }

    /// Advances the read cursor by `len` bytes.
    ///
    /// # Panics
    /// Panics if `len > readable_bytes()`. Over-retrieving is an invariant
    /// breach, not a recoverable runtime condition.
    pub fn retrieve(&mut self, len: usize) {
        assert!(
            len <= self.readable_bytes(),
            "retrieve({len}) past readable end ({} bytes readable)",
            self.readable_bytes()
        );
        self.read_pos += len;
    }

    /// Drops all readable content and resets both cursors to zero.
    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Returns the readable bytes as an owned string, then clears the buffer.
    pub fn retrieve_all_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        s
    }

    /// Reads from `fd` once, targeting the writable region and the stack
    /// scratch area in a single vectored read.
    ///
    /// If the kernel delivered more than the writable region holds, the
    /// buffer is marked full and the excess is appended from the scratch
    /// area, growing the storage. `Ok(0)` signals orderly peer shutdown. On
    /// error no cursor moves.
    pub fn read_from(&mut self, fd: RawFd) -> io::Result<usize> {
        let mut scratch = [0u8; SCRATCH_LEN];
        let writable = self.writable_bytes();

        let iov = [
            libc::iovec {
                iov_base: unsafe { self.storage.as_mut_ptr().add(self.write_pos) } as *mut _,
                iov_len: writable,
            },
            libc::iovec {
                iov_base: scratch.as_mut_ptr() as *mut _,
                iov_len: scratch.len(),
            },
        ];

        let n = unsafe { libc::readv(fd, iov.as_ptr(), 2) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let n = n as usize;
        if n <= writable {
            self.write_pos += n;
        } else {
            self.write_pos = self.storage.len();
            self.append(&scratch[..n - writable]);
        }

        Ok(n)
    }

    /// Writes the readable region to `fd` in one non-blocking write.
    ///
    /// Advances the read cursor by the amount actually written, which may be
    /// less than requested; the caller retries on the next write-ready event.
    pub fn write_to(&mut self, fd: RawFd) -> io::Result<usize> {
        let readable = self.readable_bytes();
        let n = unsafe {
            libc::write(
                fd,
                self.storage.as_ptr().add(self.read_pos) as *const _,
                readable,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let n = n as usize;
        self.retrieve(n);
        Ok(n)
    }

    fn make_space(&mut self, len: usize) {
        if self.writable_bytes() + self.prependable_bytes() < len {
            self.storage.resize(self.write_pos + len + 1, 0);
        } else {
            let readable = self.readable_bytes();
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}
