//! # SQS Consumer
//!
//! A bounded-concurrency AWS SQS consumer with a companion publisher.
//!
//! ## Features
//!
//! - Capacity-aware polling: each receive asks for exactly as many messages as
//!   there are free workers, and is skipped entirely when the pool is full
//! - Fixed-size worker pool with zero queueing by default
//! - Messages are deleted only after their handler succeeds; failures are left
//!   for SQS to redeliver after the visibility timeout
//! - Clean start/stop lifecycle and a bounded graceful drain on shutdown
//! - Large payloads offloaded to S3, compatible with the AWS SQS Extended Client
//! - `POST /push` publish endpoint
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rs_sqs_consumer::client::create_clients_from_env;
//! use rs_sqs_consumer::pool::{WorkerPool, WorkerPoolConfig};
//! use rs_sqs_consumer::receiver::{LoggingHandler, PollerConfig, SqsConsumer};
//! use rs_sqs_consumer::transport::{QueueTransport, SqsTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clients = create_clients_from_env(None).await;
//!     let transport = Arc::new(SqsTransport::new(clients.sqs));
//!     let endpoint = transport.resolve_queue_url("my-queue").await?;
//!
//!     let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
//!     let consumer = SqsConsumer::new(
//!         transport,
//!         Arc::new(LoggingHandler),
//!         pool,
//!         endpoint,
//!         PollerConfig::default(),
//!     );
//!
//!     consumer.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     consumer.graceful_shutdown(Duration::from_secs(300)).await;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod message;
pub mod pool;
pub mod publisher;
pub mod receiver;
pub mod transport;
