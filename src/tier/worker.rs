//! Bounded worker pool for promotion checks
//!
//! A fixed set of Tokio tasks share one bounded queue. When the queue is
//! full (or the pool is shutting down) the submitting caller runs the job
//! itself, so a job is never dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};

/// Unit of work run by the pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    /// Jobs accepted by the queue and not yet finished
    pending: AtomicUsize,
    /// Signalled when `pending` drops to zero
    idle: Notify,
    completed: AtomicU64,
    inline_runs: AtomicU64,
}

impl Shared {
    fn finish_one(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed-size pool of background workers
pub struct WorkerPool {
    name: String,
    sender: mpsc::Sender<Job>,
    shared: Arc<Shared>,
    workers: usize,
}

impl WorkerPool {
    /// Spawn `workers` tasks on the current Tokio runtime
    ///
    /// Fails with `CacheError::Runtime` when called outside a runtime.
    pub fn new(name: &str, workers: usize, queue: usize) -> CacheResult<Self> {
        let handle = Handle::try_current().map_err(|e| {
            CacheError::Runtime(format!("Worker pool '{}' needs a Tokio runtime: {}", name, e))
        })?;

        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            completed: AtomicU64::new(0),
            inline_runs: AtomicU64::new(0),
        });

        for id in 0..workers {
            handle.spawn(worker_loop(
                name.to_string(),
                id,
                Arc::clone(&receiver),
                Arc::clone(&shared),
            ));
        }

        debug!(pool = %name, workers = workers, queue = queue, "Worker pool started");

        Ok(Self {
            name: name.to_string(),
            sender,
            shared,
            workers,
        })
    }

    /// Queue a job, or run it on the caller when the queue is full
    ///
    /// Returns `true` if the job was queued.
    pub fn submit(&self, job: Job) -> bool {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);

        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                self.shared.inline_runs.fetch_add(1, Ordering::Relaxed);
                debug!(pool = %self.name, "Queue saturated, running job inline");
                run_job(&self.name, job);
                self.shared.finish_one();
                false
            }
        }
    }

    /// Wait until every accepted job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Jobs accepted and not yet finished
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Jobs the caller had to run itself
    pub fn inline_runs(&self) -> u64 {
        self.shared.inline_runs.load(Ordering::Relaxed)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

async fn worker_loop(
    pool: String,
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    shared: Arc<Shared>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        let Some(job) = job else {
            debug!(pool = %pool, worker = id, "Worker stopped");
            return;
        };

        run_job(&pool, job);
        shared.finish_one();
    }
}

/// A panicking job must not take its worker down with it
fn run_job(pool: &str, job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!(pool = %pool, "Worker job panicked");
    }
}
