//! Fixed-capacity worker pool for message tasks.
//!
//! Capacity is tracked with a semaphore: a task holds a run permit for as
//! long as it executes, so `active_count` is exactly `max - available`.
//! A second semaphore bounds admission (`max + queue_capacity`); with the
//! default queue capacity of zero a submission beyond `max` is rejected
//! instead of waiting.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::errors::SqsConsumerError;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of tasks executing at once. Constant for the pool's
    /// lifetime.
    pub max_concurrency: usize,

    /// Number of submitted tasks allowed to wait for a run permit. `0`
    /// disables queueing.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            max_concurrency: 10,
            queue_capacity: 0,
        }
    }
}

/// `(active, max)` read at one instant. Recomputed every poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapacitySnapshot {
    pub active_count: usize,
    pub max_count: usize,
}

impl PoolCapacitySnapshot {
    pub fn available(&self) -> usize {
        self.max_count.saturating_sub(self.active_count)
    }

    pub fn is_saturated(&self) -> bool {
        self.active_count >= self.max_count
    }
}

/// Result of [`WorkerPool::drain_and_await`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every task finished within the grace period.
    Completed,
    /// The grace period elapsed with this many tasks still running.
    Abandoned(usize),
}

pub struct WorkerPool {
    max_concurrency: usize,
    running: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    admission_capacity: usize,
    accepting: AtomicBool,
    runtime: Handle,
}

impl WorkerPool {
    /// Creates a pool that spawns onto the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    /// Creates a pool that spawns its tasks onto `runtime`.
    pub fn with_runtime(config: WorkerPoolConfig, runtime: Handle) -> Self {
        let admission_capacity = config.max_concurrency + config.queue_capacity;
        WorkerPool {
            max_concurrency: config.max_concurrency,
            running: Arc::new(Semaphore::new(config.max_concurrency)),
            admission: Arc::new(Semaphore::new(admission_capacity)),
            admission_capacity,
            accepting: AtomicBool::new(true),
            runtime,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn active_count(&self) -> usize {
        self.max_concurrency
            .saturating_sub(self.running.available_permits())
    }

    pub fn snapshot(&self) -> PoolCapacitySnapshot {
        PoolCapacitySnapshot {
            active_count: self.active_count(),
            max_count: self.max_concurrency,
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Submits a task.
    ///
    /// Returns [`SqsConsumerError::PoolSaturated`] when neither a run slot nor
    /// queue room is free, and [`SqsConsumerError::PoolClosed`] once draining
    /// has begun. A panicking task is logged and releases its slot.
    pub fn submit<F>(&self, task: F) -> Result<(), SqsConsumerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.is_accepting() {
            return Err(SqsConsumerError::PoolClosed);
        }

        let admitted = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| SqsConsumerError::PoolSaturated {
                active: self.active_count(),
                max: self.max_concurrency,
            })?;

        // Take the run permit synchronously when one is free so the next
        // capacity snapshot already counts this task.
        let ready = Arc::clone(&self.running).try_acquire_owned().ok();
        let running = Arc::clone(&self.running);

        self.runtime.spawn(async move {
            let permit = match ready {
                Some(permit) => permit,
                None => match running.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                let msg = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                tracing::error!(panic = %msg, "worker task panicked");
            }

            // Admission goes first: once `active_count` shows a free slot,
            // a submit for it must succeed.
            drop(admitted);
            drop(permit);
        });

        Ok(())
    }

    /// Stops accepting tasks and waits up to `timeout` for in-flight tasks.
    pub async fn drain_and_await(&self, timeout: Duration) -> DrainOutcome {
        self.accepting.store(false, Ordering::Release);

        let active = self.active_count();
        tracing::info!(
            active,
            timeout_secs = timeout.as_secs(),
            "draining worker pool"
        );

        // Admission permits are held until a task finishes, queued or not, so
        // getting all of them back means the pool is idle.
        let all_permits = u32::try_from(self.admission_capacity).unwrap_or(u32::MAX);
        let wait = async {
            let _ = self.admission.acquire_many(all_permits).await;
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => {
                tracing::info!("worker pool drained");
                DrainOutcome::Completed
            }
            Err(_) => {
                let remaining = self.active_count();
                tracing::warn!(
                    remaining,
                    timeout_secs = timeout.as_secs(),
                    "shutdown grace period elapsed, abandoning in-flight tasks"
                );
                DrainOutcome::Abandoned(remaining)
            }
        }
    }

    /// Number of submitted tasks waiting for a run slot.
    pub fn queued_count(&self) -> usize {
        self.admission_capacity
            .saturating_sub(self.admission.available_permits())
            .saturating_sub(self.active_count())
    }
}
