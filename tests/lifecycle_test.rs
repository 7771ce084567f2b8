mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{MockTransport, ScriptedHandler, endpoint, eventually, message};
use rs_sqs_consumer::errors::SqsConsumerError;
use rs_sqs_consumer::pool::{DrainOutcome, WorkerPool, WorkerPoolConfig};
use rs_sqs_consumer::receiver::{PollerConfig, SqsConsumer};

fn consumer(
    transport: &Arc<MockTransport>,
    handler: &Arc<ScriptedHandler>,
) -> SqsConsumer<MockTransport, ScriptedHandler> {
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default()));
    SqsConsumer::new(
        Arc::clone(transport),
        Arc::clone(handler),
        pool,
        endpoint(),
        PollerConfig {
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(5),
            ..PollerConfig::default()
        },
    )
}

#[tokio::test]
async fn start_then_stop_waits_for_the_loop() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);

    consumer.start().unwrap();
    assert!(consumer.is_running());
    consumer.stop().await;
    assert!(!consumer.is_running());

    let after_stop = transport.receive_requests().await.len();
    assert!(after_stop <= 1, "{after_stop} iterations ran after stop");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.receive_requests().await.len(), after_stop);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);

    consumer.stop().await;
    assert!(!consumer.is_running());

    consumer.start().unwrap();
    consumer.stop().await;
    assert!(!consumer.is_running());
    consumer.stop().await;
    assert!(!consumer.is_running());
}

#[tokio::test]
async fn start_twice_keeps_a_single_loop() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);

    consumer.start().unwrap();
    consumer.start().unwrap();
    assert!(consumer.is_running());

    consumer.stop().await;
    assert!(!consumer.is_running());
}

#[tokio::test]
async fn consumer_can_restart_after_stop() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);

    consumer.start().unwrap();
    consumer.stop().await;
    consumer.start().unwrap();
    transport.push_batch(vec![message(1, "hello")]).await;

    let probe = &transport;
    assert!(eventually(Duration::from_secs(5), move || async move { probe.deletes().await.len() == 1 }).await);
    consumer.stop().await;
}

#[tokio::test]
async fn stop_then_runs_callback_after_polling_ceased() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);
    let called = AtomicBool::new(false);

    consumer.start().unwrap();
    consumer
        .stop_then(|| {
            assert!(!consumer.is_running());
            called.store(true, Ordering::SeqCst);
        })
        .await;

    assert!(called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn loop_survives_receive_failures() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);
    transport.fail_receive(true);

    consumer.start().unwrap();
    let probe = &transport;
    assert!(eventually(Duration::from_secs(5), move || async move { probe.receive_requests().await.len() >= 3 }).await);

    transport.fail_receive(false);
    transport.push_batch(vec![message(1, "hello")]).await;
    assert!(eventually(Duration::from_secs(5), move || async move { probe.deletes().await == vec!["rh-1"] }).await);

    consumer.stop().await;
}

#[tokio::test]
async fn messages_flow_end_to_end() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);
    transport
        .push_batch(vec![message(1, "a"), message(2, "fail"), message(3, "c")])
        .await;

    consumer.start().unwrap();
    let probe = &handler;
    assert!(eventually(Duration::from_secs(5), move || async move { probe.processed() == 3 }).await);

    let outcome = consumer.graceful_shutdown(Duration::from_secs(5)).await;
    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(transport.deletes().await, vec!["rh-1", "rh-3"]);
}

#[tokio::test]
async fn graceful_shutdown_waits_for_in_flight_messages() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::slow(Duration::from_millis(200));
    let consumer = consumer(&transport, &handler);
    transport.push_batch(vec![message(1, "slow")]).await;

    consumer.start().unwrap();
    let pool = Arc::clone(consumer.pool());
    assert!(eventually(Duration::from_secs(5), || std::future::ready(pool.active_count() == 1)).await);

    let outcome = consumer.graceful_shutdown(Duration::from_secs(5)).await;

    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(handler.processed(), 1);
    assert_eq!(transport.deletes().await, vec!["rh-1"]);
}

#[tokio::test]
async fn graceful_shutdown_abandons_after_grace_period() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::slow(Duration::from_secs(30));
    let consumer = consumer(&transport, &handler);
    transport.push_batch(vec![message(1, "stuck")]).await;

    consumer.start().unwrap();
    let pool = Arc::clone(consumer.pool());
    assert!(eventually(Duration::from_secs(5), || std::future::ready(pool.active_count() == 1)).await);

    let outcome = consumer.graceful_shutdown(Duration::from_millis(50)).await;

    assert_eq!(outcome, DrainOutcome::Abandoned(1));
    assert!(transport.deletes().await.is_empty());
    assert!(consumer.start().is_err());
}

#[tokio::test]
async fn loop_that_missed_stop_timeout_blocks_restart() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = SqsConsumer::new(
        Arc::clone(&transport),
        Arc::clone(&handler),
        Arc::new(WorkerPool::new(WorkerPoolConfig::default())),
        endpoint(),
        PollerConfig {
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_millis(50),
            ..PollerConfig::default()
        },
    );
    transport.slow_receive(Duration::from_millis(300));

    consumer.start().unwrap();
    let probe = &transport;
    assert!(eventually(Duration::from_secs(5), move || async move { !probe.receive_requests().await.is_empty() }).await);

    consumer.stop().await;
    assert!(!consumer.is_running());
    assert!(matches!(
        consumer.start(),
        Err(SqsConsumerError::LifecycleError(_))
    ));
    assert_eq!(transport.receive_requests().await.len(), 1);

    // The old loop exits after its slow receive; then a restart is allowed.
    transport.slow_receive(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.receive_requests().await.len(), 1);
    consumer.start().unwrap();
    assert!(consumer.is_running());
    assert!(eventually(Duration::from_secs(5), move || async move { probe.receive_requests().await.len() >= 2 }).await);
    consumer.stop().await;
}

#[tokio::test]
async fn concurrent_stops_both_wait_for_the_loop() {
    let transport = MockTransport::new();
    let handler = ScriptedHandler::new();
    let consumer = consumer(&transport, &handler);
    transport.slow_receive(Duration::from_millis(100));

    consumer.start().unwrap();
    let probe = &transport;
    assert!(eventually(Duration::from_secs(5), move || async move { !probe.receive_requests().await.is_empty() }).await);

    tokio::join!(consumer.stop(), consumer.stop());

    // Both returned only after the loop exited, so restarting is allowed.
    transport.slow_receive(Duration::ZERO);
    consumer.start().unwrap();
    consumer.stop().await;
}
