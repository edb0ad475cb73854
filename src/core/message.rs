//! Message and destination types shared by producers and consumers.
//!
//! The core never looks inside a payload; transforms operate on whatever
//! serialized representation the caller chose (usually JSON text).

use bytes::Bytes;

use crate::core::error::{Error, Result};

/// Broker-level durability of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Kept in memory only; lost on broker restart.
    Transient,
    /// Written to the broker's store (delivery mode 2 on AMQP-style brokers).
    #[default]
    Persistent,
}

/// An opaque payload plus the metadata that travels with it.
#[derive(Debug, Clone)]
pub struct Message {
    pub payload: Bytes,
    pub content_type: String,
    pub delivery_mode: DeliveryMode,
}

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

impl Message {
    /// Plain-text, persistent message. The common case for hand-typed
    /// test messages.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            delivery_mode: DeliveryMode::default(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    /// Lossy UTF-8 view of the payload, for display and transforms.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::new(Bytes::from(s))
    }
}

/// Where a message is published to or consumed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A plain named queue.
    Queue(String),
    /// A topic exchange plus routing key.
    Topic { topic: String, key: String },
}

impl Destination {
    /// Resolves optional queue / topic / key arguments into exactly one
    /// addressing mode. A fully-specified queue wins over a fully-specified
    /// topic+key pair; a topic without its key (or vice versa) is rejected.
    pub fn resolve(
        queue: Option<&str>,
        topic: Option<&str>,
        key: Option<&str>,
    ) -> Result<Destination> {
        let queue = queue.map(str::trim).filter(|s| !s.is_empty());
        let topic = topic.map(str::trim).filter(|s| !s.is_empty());
        let key = key.map(str::trim).filter(|s| !s.is_empty());

        match (queue, topic, key) {
            (Some(q), _, _) => Ok(Destination::Queue(q.to_string())),
            (None, Some(t), Some(k)) => Ok(Destination::Topic {
                topic: t.to_string(),
                key: k.to_string(),
            }),
            (None, Some(_), None) | (None, None, Some(_)) => Err(Error::InvalidDestination {
                reason: "topic and key must be supplied together".into(),
            }),
            (None, None, None) => Err(Error::InvalidDestination {
                reason: "specify either a queue, or a topic and a key".into(),
            }),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Queue(q) => write!(f, "queue \"{q}\""),
            Destination::Topic { topic, key } => write!(f, "topic \"{topic}\" key \"{key}\""),
        }
    }
}
