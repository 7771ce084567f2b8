//! Queue transport boundary.
//!
//! The poll loop and the publisher only see [`QueueTransport`]; the AWS
//! implementation lives in [`sqs`], and the S3 large-payload support it can
//! be configured with lives in [`offload`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::SqsConsumerError;
use crate::message::{Message, MessageId, QueueEndpoint};

pub mod offload;
pub mod sqs;

pub use offload::{LargePayloadConfig, PayloadPointer, S3PayloadStore};
pub use sqs::SqsTransport;

/// Largest batch a single SQS `ReceiveMessage` call may request.
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Operations the consumer needs from a remote queue.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Resolves a queue name to its URL. Called once at startup.
    async fn resolve_queue_url(&self, name: &str) -> Result<QueueEndpoint, SqsConsumerError>;

    /// Receives up to `max_messages` (1..=10) messages, waiting at most
    /// `wait_seconds` for one to arrive. Returns an empty batch when the queue
    /// is idle.
    async fn receive(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: usize,
        wait_seconds: u32,
    ) -> Result<Vec<Message>, SqsConsumerError>;

    /// Deletes one delivery. Stale or already-deleted receipts are not errors.
    async fn delete(
        &self,
        endpoint: &QueueEndpoint,
        receipt_handle: &str,
    ) -> Result<(), SqsConsumerError>;

    /// Sends a message body and returns the id the queue assigned to it.
    async fn send(&self, endpoint: &QueueEndpoint, body: &str)
    -> Result<MessageId, SqsConsumerError>;
}

/// Checks a requested receive batch size against the SQS limits.
pub fn validate_batch_size(max_messages: usize) -> Result<i32, SqsConsumerError> {
    if (1..=MAX_RECEIVE_BATCH).contains(&max_messages) {
        Ok(max_messages as i32)
    } else {
        Err(SqsConsumerError::InvalidBatchSize(max_messages))
    }
}

/// Capability to acknowledge a processed message.
///
/// Dispatched work receives this instead of a reference to the poll loop, so
/// processing code never depends on the dispatcher's internals.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, message: &Message) -> Result<(), SqsConsumerError>;
}

/// [`Acknowledger`] that deletes messages through a transport, always against
/// the resolved queue URL.
pub struct QueueAcknowledger<T> {
    transport: Arc<T>,
    endpoint: QueueEndpoint,
}

impl<T> QueueAcknowledger<T> {
    pub fn new(transport: Arc<T>, endpoint: QueueEndpoint) -> Self {
        QueueAcknowledger {
            transport,
            endpoint,
        }
    }
}

#[async_trait]
impl<T> Acknowledger for QueueAcknowledger<T>
where
    T: QueueTransport + 'static,
{
    async fn ack(&self, message: &Message) -> Result<(), SqsConsumerError> {
        self.transport
            .delete(&self.endpoint, message.receipt_handle())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_limits() {
        assert_eq!(validate_batch_size(1).unwrap(), 1);
        assert_eq!(validate_batch_size(10).unwrap(), 10);
        assert!(matches!(
            validate_batch_size(0),
            Err(SqsConsumerError::InvalidBatchSize(0))
        ));
        assert!(matches!(
            validate_batch_size(11),
            Err(SqsConsumerError::InvalidBatchSize(11))
        ));
    }
}
