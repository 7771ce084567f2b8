#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rs_sqs_consumer::errors::{HandlerError, SqsConsumerError};
use rs_sqs_consumer::message::{Message, MessageId, QueueEndpoint};
use rs_sqs_consumer::pool::WorkerPool;
use rs_sqs_consumer::receiver::MessageHandler;
use rs_sqs_consumer::transport::QueueTransport;
use tokio::sync::{Mutex, Semaphore};

/// In-memory queue that records every call made against it.
#[derive(Default)]
pub struct MockTransport {
    batches: Mutex<VecDeque<Vec<Message>>>,
    receive_requests: Mutex<Vec<usize>>,
    deletes: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    fail_receive: AtomicBool,
    fail_send: AtomicBool,
    receive_delay_ms: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_batch(&self, messages: Vec<Message>) {
        self.batches.lock().await.push_back(messages);
    }

    pub fn fail_receive(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Makes every later `receive` take `delay` before answering.
    pub fn slow_receive(&self, delay: Duration) {
        self.receive_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn receive_requests(&self) -> Vec<usize> {
        self.receive_requests.lock().await.clone()
    }

    pub async fn deletes(&self) -> Vec<String> {
        let mut deletes = self.deletes.lock().await.clone();
        deletes.sort();
        deletes
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl QueueTransport for MockTransport {
    async fn resolve_queue_url(&self, name: &str) -> Result<QueueEndpoint, SqsConsumerError> {
        Ok(QueueEndpoint::new(
            name,
            format!("https://sqs.ap-northeast-2.amazonaws.com/000000000000/{name}"),
        ))
    }

    async fn receive(
        &self,
        _endpoint: &QueueEndpoint,
        max_messages: usize,
        _wait_seconds: u32,
    ) -> Result<Vec<Message>, SqsConsumerError> {
        self.receive_requests.lock().await.push(max_messages);
        let delay = self.receive_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(SqsConsumerError::ReceiveError("throttled".to_string()));
        }
        Ok(self.batches.lock().await.pop_front().unwrap_or_default())
    }

    async fn delete(
        &self,
        _endpoint: &QueueEndpoint,
        receipt_handle: &str,
    ) -> Result<(), SqsConsumerError> {
        self.deletes.lock().await.push(receipt_handle.to_string());
        Ok(())
    }

    async fn send(
        &self,
        _endpoint: &QueueEndpoint,
        body: &str,
    ) -> Result<MessageId, SqsConsumerError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(SqsConsumerError::SendError("access denied".to_string()));
        }
        let mut sent = self.sent.lock().await;
        sent.push(body.to_string());
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Fails every message whose body starts with `fail`, optionally taking a
/// while to do so.
#[derive(Default)]
pub struct ScriptedHandler {
    pub delay: Duration,
    pub processed: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(ScriptedHandler {
            delay,
            processed: AtomicUsize::new(0),
        })
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn process(&self, message: &Message) -> Result<(), HandlerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        if message.body().starts_with("fail") {
            return Err(HandlerError::new(format!("rejected {}", message.id())));
        }
        Ok(())
    }
}

pub fn message(n: usize, body: &str) -> Message {
    Message::new(format!("id-{n}"), format!("rh-{n}"), body)
}

pub fn endpoint() -> QueueEndpoint {
    QueueEndpoint::new(
        "orders",
        "https://sqs.ap-northeast-2.amazonaws.com/000000000000/orders",
    )
}

/// Occupies `count` pool slots until the returned gate is closed.
pub fn occupy(pool: &WorkerPool, count: usize) -> Arc<Semaphore> {
    let gate = Arc::new(Semaphore::new(0));
    for _ in 0..count {
        let gate = Arc::clone(&gate);
        pool.submit(async move {
            let _ = gate.acquire().await;
        })
        .expect("slot available");
    }
    gate
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
