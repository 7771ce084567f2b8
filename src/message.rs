//! Message and queue endpoint value types shared by the transport, the poll
//! loop and the handlers.

use std::collections::HashMap;
use std::sync::Arc;

/// Identifier SQS assigns to a sent message.
pub type MessageId = String;

/// A single delivery received from the queue.
///
/// The receipt handle is specific to this delivery: it is what `delete`
/// needs, and it changes every time SQS redelivers the message. The `id` is
/// stable across deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    receipt_handle: String,
    body: String,
    attributes: HashMap<String, String>,
}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Message {
            id: id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn receipt_handle(&self) -> &str {
        &self.receipt_handle
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Resolved URL of a named queue.
///
/// Resolved once at startup and then cloned into every component that talks
/// to the queue; clones share the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    name: Arc<str>,
    url: Arc<str>,
}

impl QueueEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        QueueEndpoint {
            name: Arc::from(name.into()),
            url: Arc::from(url.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}
