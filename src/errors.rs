use std::str::FromStr;

use thiserror::Error;

/// Error types for the SQS consumer and publisher.
///
/// Transport errors carry the rendered AWS SDK error context so they can be
/// logged at the iteration boundary without holding on to SDK types.
#[derive(Debug, Error)]
pub enum SqsConsumerError {
    /// A configuration value was missing or could not be parsed.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// The queue name could not be resolved to a URL. Fatal at startup.
    #[error("failed to resolve queue url for `{name}`: {reason}")]
    QueueResolutionError { name: String, reason: String },

    #[error("failed to receive messages: {0}")]
    ReceiveError(String),

    #[error("failed to delete message: {0}")]
    DeleteError(String),

    #[error("failed to send message: {0}")]
    SendError(String),

    /// Reading, writing or removing an offloaded payload in S3 failed.
    #[error("large payload storage error: {0}")]
    PayloadStoreError(String),

    /// `receive` was asked for a batch outside `1..=10`.
    #[error("invalid receive batch size {0}, expected 1..=10")]
    InvalidBatchSize(usize),

    /// The worker pool has no free slot and no queue room left.
    #[error("worker pool saturated ({active}/{max} active)")]
    PoolSaturated { active: usize, max: usize },

    /// The worker pool is draining and no longer accepts tasks.
    #[error("worker pool is closed")]
    PoolClosed,

    #[error("lifecycle error: {0}")]
    LifecycleError(String),

    #[error("{0}")]
    HandlerError(#[from] HandlerError),
}

/// Error returned by message handlers.
///
/// A handler returning this leaves the message un-acknowledged so that SQS
/// redelivers it once the visibility timeout expires.
#[derive(Debug, Error)]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a new `HandlerError` with the provided message.
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HandlerError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HandlerError::new(s))
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError::new(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError::new(s)
    }
}
