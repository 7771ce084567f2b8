//! Process-wide configuration, read once at startup from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::errors::SqsConsumerError;
use crate::pool::WorkerPoolConfig;
use crate::receiver::PollerConfig;
use crate::transport::LargePayloadConfig;
use crate::transport::offload::DEFAULT_PAYLOAD_THRESHOLD;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `SQS_QUEUE_NAME`, required.
    pub queue_name: String,
    /// `S3_BUCKET_NAME`; large-payload offload is disabled when unset.
    pub bucket_name: Option<String>,
    /// `AWS_REGION` override; ambient discovery applies when unset.
    pub region: Option<String>,
    /// `CONSUMER_CORE_THREADS`, tokio worker threads (default 5).
    pub core_threads: usize,
    /// `CONSUMER_MAX_CONCURRENCY`, concurrent message tasks (default 10).
    pub max_concurrency: usize,
    /// `CONSUMER_QUEUE_CAPACITY` (default 0, no queueing).
    pub queue_capacity: usize,
    /// `CONSUMER_SHUTDOWN_GRACE_SECS` (default 300).
    pub shutdown_grace_period: Duration,
    /// `CONSUMER_POLL_INTERVAL_MS` (default 1000).
    pub poll_interval: Duration,
    /// `LARGE_PAYLOAD_THRESHOLD_BYTES` (default 262144).
    pub payload_threshold: usize,
    /// `BIND_ADDRESS` for the publish endpoint (default `0.0.0.0:8080`).
    pub bind_address: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, SqsConsumerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SqsConsumerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let queue_name = non_empty("SQS_QUEUE_NAME").ok_or_else(|| {
            SqsConsumerError::ConfigError("SQS_QUEUE_NAME must be set".to_string())
        })?;

        let config = AppConfig {
            queue_name,
            bucket_name: non_empty("S3_BUCKET_NAME"),
            region: non_empty("AWS_REGION"),
            core_threads: parse_or(&lookup, "CONSUMER_CORE_THREADS", 5)?,
            max_concurrency: parse_or(&lookup, "CONSUMER_MAX_CONCURRENCY", 10)?,
            queue_capacity: parse_or(&lookup, "CONSUMER_QUEUE_CAPACITY", 0)?,
            shutdown_grace_period: Duration::from_secs(parse_or(
                &lookup,
                "CONSUMER_SHUTDOWN_GRACE_SECS",
                300,
            )?),
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "CONSUMER_POLL_INTERVAL_MS",
                1000,
            )?),
            payload_threshold: parse_or(
                &lookup,
                "LARGE_PAYLOAD_THRESHOLD_BYTES",
                DEFAULT_PAYLOAD_THRESHOLD,
            )?,
            bind_address: non_empty("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would leave the consumer unable to make progress.
    pub fn validate(&self) -> Result<(), SqsConsumerError> {
        if self.max_concurrency == 0 {
            return Err(SqsConsumerError::ConfigError(
                "CONSUMER_MAX_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.core_threads == 0 {
            return Err(SqsConsumerError::ConfigError(
                "CONSUMER_CORE_THREADS must be at least 1".to_string(),
            ));
        }
        if self.payload_threshold == 0 {
            return Err(SqsConsumerError::ConfigError(
                "LARGE_PAYLOAD_THRESHOLD_BYTES must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_concurrency: self.max_concurrency,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: self.poll_interval,
            stop_timeout: self.shutdown_grace_period,
            ..PollerConfig::default()
        }
    }

    pub fn large_payload_config(&self) -> Option<LargePayloadConfig> {
        self.bucket_name
            .as_ref()
            .map(|bucket| LargePayloadConfig::new(bucket).with_threshold(self.payload_threshold))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, SqsConsumerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| SqsConsumerError::ConfigError(format!("{key}={raw}: {e}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, SqsConsumerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("SQS_QUEUE_NAME", "orders")]).unwrap();

        assert_eq!(config.queue_name, "orders");
        assert_eq!(config.bucket_name, None);
        assert_eq!(config.core_threads, 5);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.queue_capacity, 0);
        assert_eq!(config.shutdown_grace_period, Duration::from_secs(300));
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.payload_threshold, 262_144);
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.large_payload_config().is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("SQS_QUEUE_NAME", "orders"),
            ("S3_BUCKET_NAME", "big-payloads"),
            ("CONSUMER_MAX_CONCURRENCY", "20"),
            ("CONSUMER_SHUTDOWN_GRACE_SECS", "30"),
            ("LARGE_PAYLOAD_THRESHOLD_BYTES", "1024"),
        ])
        .unwrap();

        assert_eq!(config.pool_config().max_concurrency, 20);
        assert_eq!(config.poller_config().stop_timeout, Duration::from_secs(30));
        let payloads = config.large_payload_config().unwrap();
        assert_eq!(payloads.bucket, "big-payloads");
        assert_eq!(payloads.threshold, 1024);
    }

    #[test]
    fn queue_name_is_required() {
        assert!(matches!(
            config_from(&[]),
            Err(SqsConsumerError::ConfigError(_))
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = config_from(&[
            ("SQS_QUEUE_NAME", "orders"),
            ("CONSUMER_MAX_CONCURRENCY", "0"),
        ]);
        assert!(matches!(result, Err(SqsConsumerError::ConfigError(_))));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let result = config_from(&[
            ("SQS_QUEUE_NAME", "orders"),
            ("CONSUMER_POLL_INTERVAL_MS", "soon"),
        ]);
        assert!(matches!(result, Err(SqsConsumerError::ConfigError(_))));
    }
}
