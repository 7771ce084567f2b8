//! S3 large-payload offload, wire compatible with the AWS SQS Extended Client.
//!
//! A body larger than the threshold is written to S3 and the queue message
//! carries a JSON pointer instead:
//!
//! ```text
//! ["software.amazon.payloadoffloading.PayloadS3Pointer",{"s3BucketName":"bucket","s3Key":"key"}]
//! ```
//!
//! together with an `ExtendedPayloadSize` number attribute holding the
//! original size. On receive the pointer is folded into the receipt handle so
//! that deleting the message can also remove the S3 object.

use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};

use crate::errors::SqsConsumerError;

/// SQS maximum message size; bodies above it must be offloaded.
pub const DEFAULT_PAYLOAD_THRESHOLD: usize = 262_144;

pub const EXTENDED_PAYLOAD_SIZE_ATTRIBUTE: &str = "ExtendedPayloadSize";
pub const LEGACY_PAYLOAD_SIZE_ATTRIBUTE: &str = "SQSLargePayloadSize";

const POINTER_CLASS: &str = "software.amazon.payloadoffloading.PayloadS3Pointer";
const BUCKET_MARKER: &str = "-..s3BucketName..-";
const KEY_MARKER: &str = "-..s3Key..-";

/// Location of an offloaded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPointer {
    pub s3_bucket_name: String,
    pub s3_key: String,
}

impl PayloadPointer {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        PayloadPointer {
            s3_bucket_name: bucket.into(),
            s3_key: key.into(),
        }
    }

    /// Renders the pointer as the message body sent in place of the payload.
    pub fn to_message_body(&self) -> Result<String, SqsConsumerError> {
        serde_json::to_string(&(POINTER_CLASS, self))
            .map_err(|e| SqsConsumerError::PayloadStoreError(e.to_string()))
    }

    pub fn from_message_body(body: &str) -> Result<Self, SqsConsumerError> {
        let (class, pointer): (String, PayloadPointer) = serde_json::from_str(body)
            .map_err(|e| SqsConsumerError::PayloadStoreError(format!("malformed pointer: {e}")))?;
        if class != POINTER_CLASS {
            return Err(SqsConsumerError::PayloadStoreError(format!(
                "unexpected pointer class `{class}`"
            )));
        }
        Ok(pointer)
    }

    /// Embeds this pointer in front of an SQS receipt handle.
    pub fn embed_in_receipt_handle(&self, receipt_handle: &str) -> String {
        format!(
            "{BUCKET_MARKER}{}{BUCKET_MARKER}{KEY_MARKER}{}{KEY_MARKER}{receipt_handle}",
            self.s3_bucket_name, self.s3_key
        )
    }

    /// Splits a receipt handle into the embedded pointer, if any, and the
    /// handle SQS actually issued.
    pub fn split_receipt_handle(receipt_handle: &str) -> (Option<PayloadPointer>, &str) {
        let parsed = (|| {
            let rest = receipt_handle.strip_prefix(BUCKET_MARKER)?;
            let (bucket, rest) = rest.split_once(BUCKET_MARKER)?;
            let rest = rest.strip_prefix(KEY_MARKER)?;
            let (key, handle) = rest.split_once(KEY_MARKER)?;
            Some((PayloadPointer::new(bucket, key), handle))
        })();

        match parsed {
            Some((pointer, handle)) => (Some(pointer), handle),
            None => (None, receipt_handle),
        }
    }
}

/// Where and above which size bodies are offloaded.
#[derive(Debug, Clone)]
pub struct LargePayloadConfig {
    pub bucket: String,
    pub threshold: usize,
}

impl LargePayloadConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        LargePayloadConfig {
            bucket: bucket.into(),
            threshold: DEFAULT_PAYLOAD_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn exceeds_threshold(&self, body: &str) -> bool {
        body.len() > self.threshold
    }
}

/// Stores, fetches and removes offloaded bodies in S3.
#[derive(Clone, Debug)]
pub struct S3PayloadStore {
    s3: aws_sdk_s3::Client,
    config: LargePayloadConfig,
}

impl S3PayloadStore {
    pub fn new(s3: aws_sdk_s3::Client, config: LargePayloadConfig) -> Self {
        S3PayloadStore { s3, config }
    }

    pub fn config(&self) -> &LargePayloadConfig {
        &self.config
    }

    pub async fn store(&self, body: &str) -> Result<PayloadPointer, SqsConsumerError> {
        let pointer = PayloadPointer::new(&self.config.bucket, uuid::Uuid::new_v4().to_string());

        self.s3
            .put_object()
            .bucket(&pointer.s3_bucket_name)
            .key(&pointer.s3_key)
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| {
                SqsConsumerError::PayloadStoreError(format!(
                    "put s3://{}/{}: {}",
                    pointer.s3_bucket_name,
                    pointer.s3_key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(
            bucket = %pointer.s3_bucket_name,
            key = %pointer.s3_key,
            size = body.len(),
            "offloaded message payload to s3"
        );
        Ok(pointer)
    }

    pub async fn fetch(&self, pointer: &PayloadPointer) -> Result<String, SqsConsumerError> {
        let output = self
            .s3
            .get_object()
            .bucket(&pointer.s3_bucket_name)
            .key(&pointer.s3_key)
            .send()
            .await
            .map_err(|e| {
                SqsConsumerError::PayloadStoreError(format!(
                    "get s3://{}/{}: {}",
                    pointer.s3_bucket_name,
                    pointer.s3_key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| SqsConsumerError::PayloadStoreError(e.to_string()))?
            .into_bytes();

        String::from_utf8(bytes.to_vec())
            .map_err(|e| SqsConsumerError::PayloadStoreError(format!("payload is not utf-8: {e}")))
    }

    pub async fn remove(&self, pointer: &PayloadPointer) -> Result<(), SqsConsumerError> {
        self.s3
            .delete_object()
            .bucket(&pointer.s3_bucket_name)
            .key(&pointer.s3_key)
            .send()
            .await
            .map_err(|e| {
                SqsConsumerError::PayloadStoreError(format!(
                    "delete s3://{}/{}: {}",
                    pointer.s3_bucket_name,
                    pointer.s3_key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
