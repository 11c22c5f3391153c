//! Bounded pool of reusable handles for the protocol layer.
//!
//! Protocol implementations that talk to an external resource (a database
//! client, for instance) check a handle out for the duration of one request
//! and return it on drop. The pool is an explicitly constructed value passed
//! to whoever needs it, never a process-wide singleton, so its lifetime and
//! shutdown are visible. The reactor itself never touches it.

use crate::error::AcquireError;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct PoolInner<T> {
    idle: Mutex<PoolSlots<T>>,
    available: Condvar,
}

struct PoolSlots<T> {
    handles: VecDeque<T>,
    closed: bool,
}

/// Fixed set of handles with blocking, timeout-bounded checkout.
///
/// Acquisition waits on the condvar itself rather than pre-checking
/// emptiness, so there is no gap between "a handle looks free" and "this
/// caller owns it".
pub struct ResourcePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> ResourcePool<T> {
    /// Seeds the pool with a fixed set of handles.
    pub fn new(handles: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(PoolSlots {
                    handles: handles.into_iter().collect(),
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Checks a handle out, blocking up to `timeout` for one to free up.
    pub fn acquire(&self, timeout: Duration) -> Result<Pooled<T>, AcquireError> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.inner.idle.lock().unwrap();

        loop {
            if slots.closed {
                return Err(AcquireError::Closed);
            }
            if let Some(handle) = slots.handles.pop_front() {
                return Ok(Pooled {
                    handle: Some(handle),
                    pool: self.inner.clone(),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AcquireError::Timeout);
            }
            let (guard, result) = self.inner.available.wait_timeout(slots, remaining).unwrap();
            slots = guard;
            if result.timed_out() && slots.handles.is_empty() {
                return Err(AcquireError::Timeout);
            }
        }
    }

    /// Number of handles currently idle.
    pub fn available(&self) -> usize {
        self.inner.idle.lock().unwrap().handles.len()
    }

    /// Marks the pool closed and drops all idle handles.
    ///
    /// Handles checked out at the time of the call are dropped when their
    /// guards are, not returned.
    pub fn close(&self) {
        let mut slots = self.inner.idle.lock().unwrap();
        slots.closed = true;
        slots.handles.clear();
        drop(slots);
        self.inner.available.notify_all();
    }
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// RAII checkout guard; the handle goes back to the pool on drop.
pub struct Pooled<T> {
    handle: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.handle.as_ref().expect("handle taken")
    }
}

impl<T> std::ops::DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.handle.as_mut().expect("handle taken")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let mut slots = self.pool.idle.lock().unwrap();
            if !slots.closed {
                slots.handles.push_back(handle);
                drop(slots);
                self.pool.available.notify_one();
            }
        }
    }
}
