use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;

use super::config::PollerConfig;
use super::functions::MessageHandler;
use crate::errors::SqsConsumerError;
use crate::message::{Message, QueueEndpoint};
use crate::pool::{PoolCapacitySnapshot, WorkerPool};
use crate::transport::{Acknowledger, QueueAcknowledger, QueueTransport};

/// What a single poll iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Every worker was busy; receive was not called.
    Saturated,
    /// Receive returned no messages.
    Idle,
    /// Messages were received and handed to the pool.
    Dispatched { received: usize, dispatched: usize },
}

/// Number of messages to request for a capacity snapshot, or `None` when
/// there is no free worker.
pub fn fetch_count(snapshot: PoolCapacitySnapshot, max_batch_size: usize) -> Option<usize> {
    let count = snapshot.available().min(max_batch_size);
    (count > 0).then_some(count)
}

/// Capacity-aware dispatcher: sizes each receive to the free worker slots and
/// submits one task per message.
pub struct PollLoop<T, H> {
    transport: Arc<T>,
    handler: Arc<H>,
    acknowledger: Arc<dyn Acknowledger>,
    pool: Arc<WorkerPool>,
    endpoint: QueueEndpoint,
    config: PollerConfig,
}

impl<T, H> PollLoop<T, H>
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
        let acknowledger: Arc<dyn Acknowledger> = Arc::new(QueueAcknowledger::new(
            Arc::clone(&transport),
            endpoint.clone(),
        ));
        PollLoop {
            transport,
            handler,
            acknowledger,
            pool,
            endpoint,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Runs one iteration without the leading sleep.
    pub async fn poll_once(&self) -> Result<IterationOutcome, SqsConsumerError> {
        let snapshot = self.pool.snapshot();
        let Some(fetch) = fetch_count(snapshot, self.config.max_batch_size) else {
            tracing::trace!(
                active = snapshot.active_count,
                max = snapshot.max_count,
                "worker pool saturated, skipping receive"
            );
            return Ok(IterationOutcome::Saturated);
        };

        let messages = self
            .transport
            .receive(&self.endpoint, fetch, self.config.wait_time_seconds)
            .await?;

        if messages.is_empty() {
            return Ok(IterationOutcome::Idle);
        }

        let received = messages.len();
        tracing::debug!(
            queue_url = %self.endpoint,
            fetch_count = fetch,
            received,
            "received messages"
        );

        if received > fetch {
            // Extra deliveries stay in flight and reappear after their
            // visibility timeout.
            tracing::warn!(
                fetch_count = fetch,
                received,
                "transport returned more messages than requested, leaving the excess unprocessed"
            );
        }

        let mut dispatched = 0;
        for message in messages.into_iter().take(fetch) {
            let message_id = message.id().to_string();
            if let Err(e) = self.dispatch(message) {
                tracing::error!(message_id = %message_id, error = %e, "failed to dispatch message");
                return Err(e);
            }
            dispatched += 1;
        }

        Ok(IterationOutcome::Dispatched {
            received,
            dispatched,
        })
    }

    fn dispatch(&self, message: Message) -> Result<(), SqsConsumerError> {
        let handler = Arc::clone(&self.handler);
        let acknowledger = Arc::clone(&self.acknowledger);
        self.pool
            .submit(process_message(handler, acknowledger, message))
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A shutdown signal ends the loop before its next iteration; an iteration
    /// already running is allowed to finish. Errors and panics inside an
    /// iteration are logged and never end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue_url = %self.endpoint,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_concurrency = self.pool.max_concurrency(),
            "poll loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            match AssertUnwindSafe(self.poll_once()).catch_unwind().await {
                Ok(Ok(outcome)) => tracing::trace!(?outcome, "poll iteration finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "poll iteration failed"),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<String>()
                        .map(String::as_str)
                        .or_else(|| panic.downcast_ref::<&str>().copied())
                        .unwrap_or("unknown panic");
                    tracing::error!(panic = %msg, "poll iteration panicked");
                }
            }
        }

        tracing::info!(queue_url = %self.endpoint, "poll loop stopped");
    }
}

/// Worker task body: run the handler, then acknowledge only on success.
async fn process_message<H>(handler: Arc<H>, acknowledger: Arc<dyn Acknowledger>, message: Message)
where
    H: MessageHandler + ?Sized,
{
    if let Err(e) = handler.process(&message).await {
        tracing::warn!(
            message_id = message.id(),
            error = %e,
            "message handler failed, leaving message for redelivery"
        );
        return;
    }

    match acknowledger.ack(&message).await {
        Ok(()) => tracing::debug!(message_id = message.id(), "message deleted"),
        Err(e) => tracing::error!(
            message_id = message.id(),
            error = %e,
            "failed to delete processed message"
        ),
    }
}
