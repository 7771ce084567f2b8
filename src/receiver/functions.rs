use crate::errors::HandlerError;
use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for processing messages pulled from the queue.
///
/// Returning `Ok(())` lets the consumer delete the message. Returning an
/// error leaves it in the queue, and SQS delivers it again once its
/// visibility timeout expires; there is no application-level retry.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes a single message.
    ///
    /// # Arguments
    ///
    /// * `message` - The received message, with any offloaded body already
    ///   loaded back from S3
    async fn process(&self, message: &Message) -> Result<(), HandlerError>;
}

/// Handler that logs each body and always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn process(&self, message: &Message) -> Result<(), HandlerError> {
        tracing::info!(message_id = message.id(), body = message.body(), "received message");
        Ok(())
    }
}

#[async_trait]
impl<F, Fut, TShared> MessageHandler for HandlerFn<F, Fut, TShared>
where
    F: Fn(Message, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    async fn process(&self, message: &Message) -> Result<(), HandlerError> {
        (self.handler_fn)(message.clone(), self.shared_resources.clone()).await
    }
}

/// Adapts an async function and a shared resource into a [`MessageHandler`].
///
/// The shared resource is cloned for every message, so it is typically an
/// `Arc` or a cheaply cloneable client.
///
/// # Type Parameters
///
/// * `F` - The message handler function type
/// * `Fut` - The future returned by the handler function
/// * `TShared` - The type of shared resources passed to the handler
///
/// # Example
///
/// ```rust
/// use rs_sqs_consumer::errors::HandlerError;
/// use rs_sqs_consumer::message::Message;
/// use rs_sqs_consumer::receiver::HandlerFn;
///
/// let handler = HandlerFn::new(
///     |message: Message, prefix: String| async move {
///         if message.body().is_empty() {
///             return Err(HandlerError::new("empty body"));
///         }
///         println!("{prefix}: {}", message.body());
///         Ok(())
///     },
///     "orders".to_string(),
/// );
/// ```
pub struct HandlerFn<F, Fut, TShared>
where
    F: Fn(Message, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    handler_fn: F,
    shared_resources: TShared,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut, TShared> HandlerFn<F, Fut, TShared>
where
    F: Fn(Message, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    pub fn new(handler_fn: F, shared_resources: TShared) -> Self {
        HandlerFn {
            handler_fn,
            shared_resources,
            _future: PhantomData,
        }
    }
}
