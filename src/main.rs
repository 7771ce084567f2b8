use std::sync::Arc;

use anyhow::{Context, Result};
use rs_sqs_consumer::client::create_clients_from_env;
use rs_sqs_consumer::config::AppConfig;
use rs_sqs_consumer::pool::{DrainOutcome, WorkerPool};
use rs_sqs_consumer::publisher::{self, Publisher};
use rs_sqs_consumer::receiver::{LoggingHandler, SqsConsumer};
use rs_sqs_consumer::transport::{QueueTransport, S3PayloadStore, SqsTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rs_sqs_consumer=info,sqs_consumer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.core_threads)
        .thread_name("consumer-worker")
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    tracing::info!(
        queue = %config.queue_name,
        max_concurrency = config.max_concurrency,
        offload_bucket = ?config.bucket_name,
        "sqs-consumer starting..."
    );

    let clients = create_clients_from_env(config.region.as_deref()).await;

    let mut transport = SqsTransport::new(clients.sqs);
    if let Some(payloads) = config.large_payload_config() {
        tracing::info!(
            bucket = %payloads.bucket,
            threshold = payloads.threshold,
            "large payload offload enabled"
        );
        transport = transport.with_large_payloads(S3PayloadStore::new(clients.s3, payloads));
    }
    let transport = Arc::new(transport);

    let endpoint = transport
        .resolve_queue_url(&config.queue_name)
        .await
        .context("Failed to resolve queue url")?;
    tracing::info!(queue_url = %endpoint, "resolved queue");

    let pool = Arc::new(WorkerPool::new(config.pool_config()));
    let consumer = SqsConsumer::new(
        Arc::clone(&transport),
        Arc::new(LoggingHandler),
        pool,
        endpoint.clone(),
        config.poller_config(),
    );

    let app = publisher::routes(Arc::new(Publisher::new(transport, endpoint)));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", config.bind_address);

    consumer.start().context("Failed to start consumer")?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "http server failed, shutting down consumer");
    }

    match consumer.graceful_shutdown(config.shutdown_grace_period).await {
        DrainOutcome::Completed => tracing::info!("sqs-consumer shutdown complete"),
        DrainOutcome::Abandoned(remaining) => {
            tracing::warn!(remaining, "sqs-consumer shut down with unfinished messages")
        }
    }

    served.context("Server error")
}
