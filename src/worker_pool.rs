//! # Worker Pool Module
//!
//! The execution context behind `request_async` / `notify_async`.
//!
//! ## Features
//!
//! - **Executor seam**: anything that can run a boxed closure elsewhere implements [`Executor`]
//! - **Worker Pools**: N `may` coroutines sharing one unbounded job queue
//! - **Completion handles**: [`Completion`] carries a job's result back over a `may` channel
//! - **Metrics**: queue depth, dispatch count and completion count for monitoring
//!
//! ## Configuration
//!
//! - `CORREOS_WORKERS`: Number of worker coroutines (default: 4)
//! - `CORREOS_STACK_SIZE`: Coroutine stack size, decimal or `0x` hex (default: 64 KiB)

use crate::error::{MediatorError, Result};
use crate::instance_cache::panic_message;
use may::sync::mpsc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A unit of work submitted to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a closure somewhere other than the calling thread.
pub trait Executor: Send + Sync {
    fn submit(&self, job: Job) -> Result<()>;
}

/// Runs jobs on tokio's blocking thread pool.
impl Executor for tokio::runtime::Handle {
    fn submit(&self, job: Job) -> Result<()> {
        drop(self.spawn_blocking(job));
        Ok(())
    }
}

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_STACK_SIZE: usize = 0x10000; // 64KB

/// Parse a stack size given in decimal or `0x`-prefixed hex.
pub(crate) fn parse_stack_size(s: &str) -> Option<usize> {
    if let Some(hex) = s.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Configuration for a worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let num_workers = std::env::var("CORREOS_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WORKERS);

        let stack_size = std::env::var("CORREOS_STACK_SIZE")
            .ok()
            .and_then(|s| parse_stack_size(&s))
            .unwrap_or(DEFAULT_STACK_SIZE);

        Self {
            num_workers,
            stack_size,
        }
    }

    #[must_use]
    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers,
            stack_size,
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_WORKERS,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Current queue depth (approximate)
    pub queue_depth: AtomicUsize,
    /// Total jobs submitted
    pub dispatched_count: AtomicU64,
    /// Total jobs finished, including ones that panicked
    pub completed_count: AtomicU64,
    /// Jobs that panicked
    pub panicked_count: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panicked_count.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_panicked_count(&self) -> u64 {
        self.panicked_count.load(Ordering::Relaxed)
    }
}

/// A pool of `may` worker coroutines draining a shared job queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Job>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl WorkerPool {
    /// Create a new worker pool and spawn its coroutines.
    ///
    /// # Safety
    ///
    /// This function is marked unsafe because it spawns coroutines using `may::coroutine::Builder::spawn()`,
    /// which is unsafe in the `may` runtime. The caller must ensure the May coroutine runtime is properly initialized,
    /// and that submitted jobs do not block on thread-local state the coroutine scheduler cannot see.
    pub unsafe fn new(config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let metrics = Arc::new(WorkerPoolMetrics::default());

        // All workers share the receiver and so balance load between them.
        let rx = Arc::new(rx);

        info!(
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&metrics);

            // SAFETY: upheld by the caller of `WorkerPool::new`; the closure is
            // Send + 'static and owns everything it touches.
            let spawn_result = unsafe {
                may::coroutine::Builder::new()
                    .name(format!("correos-worker-{worker_id}"))
                    .stack_size(config.stack_size)
                    .spawn(move || {
                        debug!(worker_id = worker_id, "Worker coroutine started");

                        while let Ok(job) = rx.recv() {
                            if let Err(panic) =
                                std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                            {
                                metrics.record_panic();
                                error!(
                                    worker_id = worker_id,
                                    panic_message = %panic_message(panic.as_ref()),
                                    "Job panicked - CRITICAL"
                                );
                            }
                            metrics.record_completion();
                        }

                        debug!(worker_id = worker_id, "Worker coroutine exiting");
                    })
            };

            if let Err(e) = spawn_result {
                error!(
                    worker_id = worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

impl Executor for WorkerPool {
    fn submit(&self, job: Job) -> Result<()> {
        self.metrics.record_dispatch();
        if let Err(e) = self.sender.send(job) {
            self.metrics.record_completion();
            error!(error = %e, "Worker pool channel disconnected");
            return Err(MediatorError::ExecutorClosed(
                "worker pool has no running workers".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to the outcome of an asynchronous dispatch.
#[must_use = "a Completion does nothing unless waited on"]
pub struct Completion<T> {
    target: String,
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> Completion<T> {
    pub(crate) fn new(target: String, rx: mpsc::Receiver<Result<T>>) -> Self {
        Self { target, rx }
    }

    /// Name the dispatch was addressed to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Block until the dispatch finishes.
    ///
    /// Blocks the coroutine when called from inside one, the thread otherwise.
    pub fn wait(self) -> Result<T> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(MediatorError::Abandoned(self.target)),
        }
    }

    /// The outcome if the dispatch has already finished.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(std::sync::mpsc::TryRecvError::Empty) => None,
            Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                Some(Err(MediatorError::Abandoned(self.target.clone())))
            }
        }
    }
}
