//! Fixed-size worker pool.
//!
//! Workers consume unit-of-work closures from a bounded FIFO guarded by a
//! mutex and a pair of condition variables. [`WorkerPool::work`] blocks while
//! the FIFO is at capacity — that back-pressure is what lets the heart catch
//! a wedged pool: once every worker is stuck and the FIFO fills, the
//! submitting loop stops beating.
//!
//! There is no ordering guarantee between jobs submitted from different
//! threads; jobs submitted from one thread run in submission order only on a
//! single-worker pool. Jobs run to completion and are not cancellable.
//! A panicking job is caught and logged; the worker keeps going.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Default FIFO capacity before `work` applies back-pressure.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

struct Backlog {
    jobs: Mutex<VecDeque<Job>>,
    /// Signaled when a job is queued.
    available: Condvar,
    /// Signaled when a job is taken.
    space: Condvar,
    capacity: usize,
    running: AtomicBool,
}

/// A fixed set of worker threads draining a shared bounded FIFO.
pub struct WorkerPool {
    backlog: Arc<Backlog>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers (pass `num_cpus::get()` for the
    /// hardware-concurrency default) with the default FIFO depth.
    pub fn new(worker_count: usize) -> Self {
        Self::with_queue_depth(worker_count, DEFAULT_QUEUE_DEPTH)
    }

    /// Spawn `worker_count` workers over a FIFO holding at most `depth`
    /// pending jobs.
    pub fn with_queue_depth(worker_count: usize, depth: usize) -> Self {
        let backlog = Arc::new(Backlog {
            jobs: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity: depth.max(1),
            running: AtomicBool::new(true),
        });
        let workers = (0..worker_count.max(1))
            .map(|index| {
                let backlog = Arc::clone(&backlog);
                thread::Builder::new()
                    .name(format!("worker-{index}"))
                    .spawn(move || worker_main(&backlog))
                    .expect("spawn worker thread")
            })
            .collect();
        Self { backlog, workers }
    }

    /// Append a job and wake one waiting worker. Blocks while the FIFO is
    /// full and the pool is running.
    pub fn work(&self, job: impl FnOnce() + Send + 'static) {
        let mut jobs = lock(&self.backlog.jobs);
        while jobs.len() >= self.backlog.capacity && self.backlog.running.load(Ordering::SeqCst) {
            jobs = self
                .backlog
                .space
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
        jobs.push_back(Box::new(job));
        self.backlog.available.notify_one();
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.backlog.running.store(false, Ordering::SeqCst);
        self.backlog.available.notify_all();
        self.backlog.space.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("worker pool stopped");
    }
}

fn worker_main(backlog: &Backlog) {
    loop {
        let job = {
            let mut jobs = lock(&backlog.jobs);
            loop {
                if let Some(job) = jobs.pop_front() {
                    backlog.space.notify_one();
                    break job;
                }
                if !backlog.running.load(Ordering::SeqCst) {
                    return;
                }
                jobs = backlog
                    .available
                    .wait(jobs)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("worker job panicked; continuing");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
