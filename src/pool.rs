//! Fixed-size worker pool consuming a shared FIFO queue of closures.
//!
//! The reactor submits connection-processing work here so blocking
//! application code never stalls the event loop. The queue is the only
//! lock-guarded structure shared between the reactor and the workers.

use crate::error::SubmitError;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    jobs: VecDeque<Job>,
    closing: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    not_empty: Condvar,
}

/// Fixed set of worker threads draining a bounded FIFO queue.
///
/// A pool built with zero workers accepts no jobs; callers are expected to
/// run the work inline instead.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    max_queue: usize,
}

impl ThreadPool {
    /// Spawns `workers` threads sharing one queue bounded at `max_queue`
    /// pending jobs.
    pub fn new(workers: usize, max_queue: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                jobs: VecDeque::new(),
                closing: false,
            }),
            not_empty: Condvar::new(),
        });

        let handles = (0..workers)
            .map(|i| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("riptide-worker-{i}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("spawn worker thread")
            })
            .collect();

        Self {
            shared,
            workers: handles,
            max_queue,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues `job` and wakes one worker.
    ///
    /// Fails explicitly instead of growing without bound or dropping work
    /// silently: the caller decides how to apply backpressure.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), SubmitError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closing {
            return Err(SubmitError::ShuttingDown);
        }
        if self.workers.is_empty() {
            return Err(SubmitError::NoWorkers);
        }
        if state.jobs.len() >= self.max_queue {
            return Err(SubmitError::QueueFull);
        }
        state.jobs.push_back(Box::new(job));
        drop(state);

        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Signals the workers to stop and blocks until every one has exited.
    ///
    /// Jobs already queued are drained before the workers exit.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.closing {
                return;
            }
            state.closing = true;
        }
        self.shared.not_empty.notify_all();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.closing {
                    return;
                }
                state = shared.not_empty.wait(state).unwrap();
            }
        };

        // A panicking task is isolated: log it and keep the worker alive.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!("worker task panicked: {msg}");
        }
    }
}
