use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::errors::SqsConsumerError;
use crate::message::QueueEndpoint;
use crate::pool::{DrainOutcome, WorkerPool};
use crate::transport::QueueTransport;

mod config;
mod functions;
mod poll_loop;

pub use config::PollerConfig;
pub use functions::{HandlerFn, LoggingHandler, MessageHandler};
pub use poll_loop::{IterationOutcome, PollLoop, fetch_count};

/// Handle to a running poll task.
struct Poller {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Lifecycle controller for one queue consumer.
///
/// Owns the running flag and the poll task. `start()` launches the poll
/// loop on its own task, separate from the worker pool's tasks; `stop()`
/// ends it after the current iteration. Draining the worker pool is a
/// separate step, see [`SqsConsumer::graceful_shutdown`].
pub struct SqsConsumer<T, H> {
    poll_loop: Arc<PollLoop<T, H>>,
    pool: Arc<WorkerPool>,
    running: AtomicBool,
    poller: Mutex<Option<Poller>>,
}

impl<T, H> SqsConsumer<T, H>
where
    T: QueueTransport + 'static,
    H: MessageHandler + 'static,
{
    pub fn new(
        transport: Arc<T>,
        handler: Arc<H>,
        pool: Arc<WorkerPool>,
        endpoint: QueueEndpoint,
        config: PollerConfig,
    ) -> Self {
        let poll_loop = PollLoop::new(transport, handler, Arc::clone(&pool), endpoint, config);
        SqsConsumer {
            poll_loop: Arc::new(poll_loop),
            pool,
            running: AtomicBool::new(false),
            poller: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Starts polling. Calling it while already running is a no-op.
    ///
    /// Fails while a `stop()` is in progress, while a previous poll loop that
    /// did not stop in time is still alive, and after the pool was drained.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SqsConsumerError> {
        let Ok(mut poller) = self.poller.try_lock() else {
            return Err(SqsConsumerError::LifecycleError(
                "consumer is stopping".to_string(),
            ));
        };
        if let Some(current) = poller.as_ref() {
            if self.is_running() {
                tracing::warn!("consumer already running");
                return Ok(());
            }
            if !current.task.is_finished() {
                return Err(SqsConsumerError::LifecycleError(
                    "previous poll loop has not exited yet".to_string(),
                ));
            }
            *poller = None;
        }
        if !self.pool.is_accepting() {
            return Err(SqsConsumerError::LifecycleError(
                "worker pool has been drained, consumer cannot restart".to_string(),
            ));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let poll_loop = Arc::clone(&self.poll_loop);
        let task = tokio::spawn(async move { poll_loop.run(shutdown_rx).await });

        *poller = Some(Poller { shutdown, task });
        self.running.store(true, Ordering::Release);
        tracing::info!("consumer started");
        Ok(())
    }

    /// Stops polling and waits for the poll task to exit.
    ///
    /// The wait is bounded by the poller's `stop_timeout`. A loop that does
    /// not exit in time is logged and kept, so a later `stop()` waits for it
    /// again and `start()` refuses to run a second loop beside it. Concurrent
    /// calls wait for each other. Calling `stop` on a stopped consumer does
    /// nothing.
    pub async fn stop(&self) {
        let mut poller = self.poller.lock().await;
        self.running.store(false, Ordering::Release);
        let Some(current) = poller.as_mut() else {
            tracing::debug!("consumer already stopped");
            return;
        };

        // Err only if the loop already exited and dropped its receiver.
        let _ = current.shutdown.send(true);

        let stop_timeout = self.poll_loop.config().stop_timeout;
        match tokio::time::timeout(stop_timeout, &mut current.task).await {
            Ok(Ok(())) => tracing::info!("consumer stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "poll task ended abnormally"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = stop_timeout.as_secs(),
                    "poll loop did not stop in time, proceeding with shutdown"
                );
                return;
            }
        }
        *poller = None;
    }

    /// Stops polling, then runs `callback`.
    pub async fn stop_then<F>(&self, callback: F)
    where
        F: FnOnce(),
    {
        self.stop().await;
        callback();
    }

    /// Stops polling, then waits up to `grace_period` for in-flight messages.
    ///
    /// No new work is submitted once polling has stopped, so the pool only
    /// drains what is already running.
    pub async fn graceful_shutdown(&self, grace_period: Duration) -> DrainOutcome {
        self.stop().await;
        self.pool.drain_and_await(grace_period).await
    }
}
