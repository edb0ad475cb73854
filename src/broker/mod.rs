//! Pluggable broker abstraction.
//!
//! One [`Connection`] trait fronts the broker variants (RabbitMQ-like and
//! Kafka-like); [`create_connection`] is the factory keyed on
//! [`BrokerKind`]. Producers and consumers are built from a connection and
//! talk to the broker through [`Channel`] handles, which treat the actual
//! wire encoding as an implementation detail (`wire`).

pub(crate) mod connection;
pub mod consumer;
pub mod kafka;
pub mod producer;
pub mod rabbit;
pub mod wire;

use async_trait::async_trait;
use bytes::Bytes;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{BrokerConfig, RetryConfig};
use crate::core::error::{Error, Result};
use crate::core::message::{Destination, Message};

pub use consumer::Consumer;
pub use producer::Producer;

/// Supported broker variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    Rabbit,
    Kafka,
}

impl std::fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerKind::Rabbit => f.write_str("rabbit"),
            BrokerKind::Kafka => f.write_str("kafka"),
        }
    }
}

impl FromStr for BrokerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rabbit" | "rabbitmq" => Ok(BrokerKind::Rabbit),
            "kafka" => Ok(BrokerKind::Kafka),
            other => Err(Error::UnsupportedBroker { kind: other.into() }),
        }
    }
}

/// A logical channel bound to a live transport.
///
/// Channels are not shared across services; a channel obtained before a
/// `disconnect()` reports `is_open() == false` afterwards.
#[async_trait]
pub trait Channel: Send {
    /// Declares a durable queue, returning the name to poll.
    async fn declare_queue(&mut self, queue: &str) -> Result<String>;

    /// Declares a topic exchange and binds a server-generated exclusive
    /// queue to it with the given routing key. Returns the generated
    /// queue name; consumers poll that, never the topic itself.
    async fn bind_topic(&mut self, topic: &str, key: &str) -> Result<String>;

    /// Publishes one message. Fire-and-forget; durability is carried by
    /// the message's delivery mode.
    async fn publish(&mut self, destination: &Destination, message: &Message) -> Result<()>;

    /// Non-blocking fetch of a single message with auto-ack semantics.
    /// Returns `None` when the queue is currently empty.
    async fn fetch(&mut self, queue: &str) -> Result<Option<Bytes>>;

    fn is_open(&self) -> bool;
}

/// Owns (at most) one live transport to a broker instance.
#[async_trait]
pub trait Connection: Send + Sync {
    fn kind(&self) -> BrokerKind;

    fn config(&self) -> &BrokerConfig;

    fn retry(&self) -> &RetryConfig;

    fn auto_reconnect(&self) -> bool;

    fn set_auto_reconnect(&self, enabled: bool);

    /// Establishes the transport. No-op when already connected. Transient
    /// failures are retried with exponential backoff up to the configured
    /// bound; authorization rejection fails immediately with no retry.
    async fn connect(&self) -> Result<()>;

    /// Releases the transport if present. Idempotent; never fails on an
    /// already-disconnected connection. Invalidates issued channels.
    async fn disconnect(&self) -> Result<()>;

    /// Returns a fresh logical channel, reconnecting first when
    /// auto-reconnect is enabled and the transport is absent or closed.
    async fn open_channel(&self) -> Result<Box<dyn Channel>>;
}

/// Factory helpers available on any boxed connection.
pub trait ConnectionExt {
    fn create_producer(&self) -> Producer;
    fn create_consumer(&self) -> Consumer;
}

impl ConnectionExt for Arc<dyn Connection> {
    fn create_producer(&self) -> Producer {
        Producer::new(Arc::clone(self))
    }

    fn create_consumer(&self) -> Consumer {
        Consumer::new(Arc::clone(self))
    }
}

/// Builds a connection for the given broker kind. Validates the
/// configuration up front; does not itself connect.
pub fn create_connection(
    kind: BrokerKind,
    config: Arc<BrokerConfig>,
    retry: RetryConfig,
) -> Result<Arc<dyn Connection>> {
    config.validate()?;
    match kind {
        BrokerKind::Rabbit => Ok(Arc::new(rabbit::RabbitConnection::new(config, retry))),
        BrokerKind::Kafka => Ok(Arc::new(kafka::KafkaConnection::new(config, retry))),
    }
}
