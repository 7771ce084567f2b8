use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sqs::types::MessageAttributeValue;

use super::offload::{
    EXTENDED_PAYLOAD_SIZE_ATTRIBUTE, LEGACY_PAYLOAD_SIZE_ATTRIBUTE, PayloadPointer, S3PayloadStore,
};
use super::{QueueTransport, validate_batch_size};
use crate::errors::SqsConsumerError;
use crate::message::{Message, MessageId, QueueEndpoint};

/// Error codes SQS returns for receipts that were already deleted or expired.
const STALE_RECEIPT_CODES: &[&str] = &["ReceiptHandleIsInvalid", "InvalidParameterValue"];

/// [`QueueTransport`] backed by AWS SQS, optionally offloading large bodies
/// to S3.
#[derive(Clone, Debug)]
pub struct SqsTransport {
    sqs_client: aws_sdk_sqs::Client,
    payloads: Option<S3PayloadStore>,
}

impl SqsTransport {
    pub fn new(sqs_client: aws_sdk_sqs::Client) -> Self {
        SqsTransport {
            sqs_client,
            payloads: None,
        }
    }

    /// Enables S3 offload for bodies above the store's threshold.
    pub fn with_large_payloads(mut self, store: S3PayloadStore) -> Self {
        self.payloads = Some(store);
        self
    }

    /// Converts an SDK message, pulling an offloaded body back from S3.
    async fn rehydrate(
        &self,
        message: aws_sdk_sqs::types::Message,
    ) -> Result<Option<Message>, SqsConsumerError> {
        let Some(receipt_handle) = message.receipt_handle() else {
            tracing::warn!(message_id = ?message.message_id(), "received a message without a receipt handle");
            return Ok(None);
        };
        let Some(body) = message.body() else {
            tracing::warn!(message_id = ?message.message_id(), "received a message with no body");
            return Ok(None);
        };
        let id = message.message_id().unwrap_or_default();

        let mut attributes: HashMap<String, String> = message
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(name, value)| {
                        value.string_value().map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let offloaded = attributes.remove(EXTENDED_PAYLOAD_SIZE_ATTRIBUTE).is_some()
            | attributes.remove(LEGACY_PAYLOAD_SIZE_ATTRIBUTE).is_some();

        if !offloaded {
            return Ok(Some(
                Message::new(id, receipt_handle, body).with_attributes(attributes),
            ));
        }

        let Some(store) = &self.payloads else {
            tracing::warn!(
                message_id = id,
                "received an offloaded payload but large payload support is not configured"
            );
            return Ok(Some(
                Message::new(id, receipt_handle, body).with_attributes(attributes),
            ));
        };

        let pointer = PayloadPointer::from_message_body(body)?;
        let payload = store.fetch(&pointer).await?;

        Ok(Some(
            Message::new(
                id,
                pointer.embed_in_receipt_handle(receipt_handle),
                payload,
            )
            .with_attributes(attributes),
        ))
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn resolve_queue_url(&self, name: &str) -> Result<QueueEndpoint, SqsConsumerError> {
        let output = self
            .sqs_client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| SqsConsumerError::QueueResolutionError {
                name: name.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let url = output
            .queue_url()
            .ok_or_else(|| SqsConsumerError::QueueResolutionError {
                name: name.to_string(),
                reason: "response contained no queue url".to_string(),
            })?;

        Ok(QueueEndpoint::new(name, url))
    }

    async fn receive(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: usize,
        wait_seconds: u32,
    ) -> Result<Vec<Message>, SqsConsumerError> {
        let batch_size = validate_batch_size(max_messages)?;

        let output = self
            .sqs_client
            .receive_message()
            .queue_url(endpoint.url())
            .max_number_of_messages(batch_size)
            .wait_time_seconds(wait_seconds as i32)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| SqsConsumerError::ReceiveError(DisplayErrorContext(&e).to_string()))?;

        let mut messages = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let message_id = message.message_id().map(str::to_string);
            match self.rehydrate(message).await {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                // Left in flight; SQS redelivers it after the visibility timeout.
                Err(e) => {
                    tracing::error!(message_id = ?message_id, error = %e, "failed to load offloaded payload")
                }
            }
        }
        Ok(messages)
    }

    async fn delete(
        &self,
        endpoint: &QueueEndpoint,
        receipt_handle: &str,
    ) -> Result<(), SqsConsumerError> {
        let (pointer, sqs_receipt_handle) = PayloadPointer::split_receipt_handle(receipt_handle);

        let result = self
            .sqs_client
            .delete_message()
            .queue_url(endpoint.url())
            .receipt_handle(sqs_receipt_handle)
            .send()
            .await;

        if let Err(e) = result {
            let stale = e.as_service_error().is_some_and(|se| {
                se.is_receipt_handle_is_invalid()
                    || se.code().is_some_and(|code| STALE_RECEIPT_CODES.contains(&code))
            });
            if !stale {
                return Err(SqsConsumerError::DeleteError(
                    DisplayErrorContext(&e).to_string(),
                ));
            }
            // The message may have been redelivered under a new receipt, so
            // its payload must stay in S3.
            tracing::warn!(
                queue_url = %endpoint,
                code = ?e.code(),
                "receipt handle already deleted or expired"
            );
            return Ok(());
        }

        if let (Some(pointer), Some(store)) = (pointer, &self.payloads) {
            store.remove(&pointer).await?;
        }
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &QueueEndpoint,
        body: &str,
    ) -> Result<MessageId, SqsConsumerError> {
        let mut request = self.sqs_client.send_message().queue_url(endpoint.url());

        match &self.payloads {
            Some(store) if store.config().exceeds_threshold(body) => {
                let pointer = store.store(body).await?;
                let size = MessageAttributeValue::builder()
                    .data_type("Number")
                    .string_value(body.len().to_string())
                    .build()
                    .map_err(|e| SqsConsumerError::SendError(e.to_string()))?;
                request = request
                    .message_body(pointer.to_message_body()?)
                    .message_attributes(EXTENDED_PAYLOAD_SIZE_ATTRIBUTE, size);
            }
            _ => request = request.message_body(body),
        }

        let output = request
            .send()
            .await
            .map_err(|e| SqsConsumerError::SendError(DisplayErrorContext(&e).to_string()))?;

        output
            .message_id()
            .map(str::to_string)
            .ok_or_else(|| SqsConsumerError::SendError("response contained no message id".to_string()))
    }
}
