//! Deadline-ordered idle-connection reaper.
//!
//! A binary min-heap keyed by absolute expiry time, with an auxiliary
//! `id -> heap position` index so any node can be rescheduled or cancelled in
//! O(log n), not just the root. The reactor owns the heap exclusively, so no
//! locking is needed; callbacks are `Send` only so the owning server can move
//! between threads as a whole.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

type ExpireCallback = Box<dyn FnMut(RawFd) + Send>;

struct TimerNode {
    id: RawFd,
    expire_at: Instant,
    on_expire: ExpireCallback,
}

/// Min-heap of per-connection deadlines.
///
/// Each connection holds at most one node at a time: re-adding or adjusting
/// an existing id updates the node in place rather than duplicating it.
pub struct TimerHeap {
    heap: Vec<TimerNode>,
    index: HashMap<RawFd, usize>,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Schedules `on_expire` to fire for `id` after `delay`.
    ///
    /// If `id` already has a node, its deadline and callback are replaced in
    /// place and the node is re-sifted.
    pub fn add(
        &mut self,
        id: RawFd,
        delay: Duration,
        on_expire: impl FnMut(RawFd) + Send + 'static,
    ) {
        let expire_at = Instant::now() + delay;

        if let Some(&i) = self.index.get(&id) {
            self.heap[i].expire_at = expire_at;
            self.heap[i].on_expire = Box::new(on_expire);
            self.resift(i);
            return;
        }

        let i = self.heap.len();
        self.heap.push(TimerNode {
            id,
            expire_at,
            on_expire: Box::new(on_expire),
        });
        self.index.insert(id, i);
        self.sift_up(i);
    }

    /// Pushes `id`'s deadline to `now + delay`, re-sifting to restore heap
    /// order. Called on every read/write touch to implement the sliding idle
    /// window. Unknown ids are ignored.
    pub fn adjust(&mut self, id: RawFd, delay: Duration) {
        if let Some(&i) = self.index.get(&id) {
            self.heap[i].expire_at = Instant::now() + delay;
            self.resift(i);
        }
    }

    /// Cancels `id`'s node without firing its callback.
    pub fn remove(&mut self, id: RawFd) {
        if let Some(&i) = self.index.get(&id) {
            self.delete(i);
        }
    }

    /// Fires `id`'s callback immediately, then removes the node.
    pub fn trigger(&mut self, id: RawFd) {
        if let Some(&i) = self.index.get(&id) {
            let mut node = self.delete(i);
            (node.on_expire)(node.id);
        }
    }

    /// Fires every node whose deadline is at or before `now`, earliest first,
    /// stopping at the first node still in the future.
    pub fn tick(&mut self, now: Instant) {
        while let Some(root) = self.heap.first() {
            if root.expire_at > now {
                break;
            }
            let mut node = self.delete(0);
            (node.on_expire)(node.id);
        }
    }

    /// Fires expired nodes, then returns the delay until the next deadline so
    /// the caller can size its readiness-wait timeout. `None` when empty.
    pub fn next_tick(&mut self) -> Option<Duration> {
        let now = Instant::now();
        self.tick(now);
        self.heap
            .first()
            .map(|node| node.expire_at.saturating_duration_since(now))
    }

    /// Removes the node at heap position `i`, keeping heap order and the
    /// position index consistent.
    fn delete(&mut self, i: usize) -> TimerNode {
        let last = self.heap.len() - 1;
        if i < last {
            self.swap(i, last);
        }
        let node = self.heap.pop().expect("delete from empty heap");
        self.index.remove(&node.id);

        if i < self.heap.len() {
            self.resift(i);
        }
        node
    }

    fn resift(&mut self, i: usize) {
        if !self.sift_down(i) {
            self.sift_up(i);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].expire_at <= self.heap[i].expire_at {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Returns true if the node moved.
    fn sift_down(&mut self, mut i: usize) -> bool {
        let start = i;
        let n = self.heap.len();
        loop {
            let mut child = 2 * i + 1;
            if child >= n {
                break;
            }
            if child + 1 < n && self.heap[child + 1].expire_at < self.heap[child].expire_at {
                child += 1;
            }
            if self.heap[i].expire_at <= self.heap[child].expire_at {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].id, a);
        self.index.insert(self.heap[b].id, b);
    }
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}
