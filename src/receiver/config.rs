use std::time::Duration;

use crate::transport::MAX_RECEIVE_BATCH;

/// Configuration for the poll loop.
///
/// # Fields
/// - `poll_interval`: Pause before every iteration, so an idle queue does not
///   turn the loop into a hot spin.
/// - `max_batch_size`: Upper bound on a single receive request (SQS allows 10).
/// - `wait_time_seconds`: Long-polling wait passed to receive.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,

    pub max_batch_size: usize,

    /// Kept at `0` by default: fetches are sized to current pool capacity,
    /// and waiting on the queue would make that size stale.
    pub wait_time_seconds: u32,

    /// How long `stop()` waits for the loop to confirm it has exited.
    pub stop_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            poll_interval: Duration::from_millis(1000),
            max_batch_size: MAX_RECEIVE_BATCH,
            wait_time_seconds: 0,
            stop_timeout: Duration::from_secs(300),
        }
    }
}
