//! Publishing side: a small service bound to the resolved queue and the
//! `POST /push` route that forwards raw bodies to it.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;

use crate::errors::SqsConsumerError;
use crate::message::{MessageId, QueueEndpoint};
use crate::transport::QueueTransport;

/// Sends messages to one queue. Bodies above the transport's offload
/// threshold go through S3 transparently.
pub struct Publisher<T> {
    transport: Arc<T>,
    endpoint: QueueEndpoint,
}

impl<T> Publisher<T>
where
    T: QueueTransport + 'static,
{
    pub fn new(transport: Arc<T>, endpoint: QueueEndpoint) -> Self {
        Publisher {
            transport,
            endpoint,
        }
    }

    pub async fn publish(&self, body: &str) -> Result<MessageId, SqsConsumerError> {
        let message_id = self.transport.send(&self.endpoint, body).await?;
        tracing::debug!(
            queue_url = %self.endpoint,
            message_id = %message_id,
            size = body.len(),
            "published message"
        );
        Ok(message_id)
    }
}

/// Builds the router exposing `POST /push`.
pub fn routes<T>(publisher: Arc<Publisher<T>>) -> Router
where
    T: QueueTransport + 'static,
{
    Router::new()
        .route("/push", post(push::<T>))
        .with_state(publisher)
}

async fn push<T>(
    State(publisher): State<Arc<Publisher<T>>>,
    body: String,
) -> Result<StatusCode, SqsConsumerError>
where
    T: QueueTransport + 'static,
{
    publisher.publish(&body).await?;
    Ok(StatusCode::OK)
}

impl IntoResponse for SqsConsumerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
