//! RabbitMQ-like broker variant.
//!
//! Supports both addressing modes: plain durable queues, and topic
//! exchanges with a routing key. Consuming from a topic binds a
//! server-generated exclusive queue and polls that, never the topic name
//! directly.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::{BrokerConfig, RetryConfig};
use crate::core::error::{Error, Result};
use crate::core::message::{DeliveryMode, Destination, Message};

use super::connection::ConnCore;
use super::wire::{
    encode_fields, decode_fields, OP_BIND_TOPIC, OP_DECLARE_QUEUE, OP_FETCH, OP_PUBLISH, RE_EMPTY,
    RE_MSG,
};
use super::{BrokerKind, Channel, Connection};

pub struct RabbitConnection {
    core: Arc<ConnCore>,
}

impl RabbitConnection {
    pub fn new(config: Arc<BrokerConfig>, retry: RetryConfig) -> Self {
        Self {
            core: ConnCore::new(config, retry, "vhost-plain"),
        }
    }
}

#[async_trait]
impl Connection for RabbitConnection {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Rabbit
    }

    fn config(&self) -> &BrokerConfig {
        &self.core.config
    }

    fn retry(&self) -> &RetryConfig {
        &self.core.retry
    }

    fn auto_reconnect(&self) -> bool {
        self.core.auto_reconnect()
    }

    fn set_auto_reconnect(&self, enabled: bool) {
        self.core.set_auto_reconnect(enabled);
    }

    async fn connect(&self) -> Result<()> {
        self.core.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.disconnect().await;
        Ok(())
    }

    async fn open_channel(&self) -> Result<Box<dyn Channel>> {
        self.core.ensure_connected().await?;
        Ok(Box::new(RabbitChannel {
            generation: self.core.generation(),
            core: Arc::clone(&self.core),
        }))
    }
}

pub struct RabbitChannel {
    core: Arc<ConnCore>,
    generation: u64,
}

#[async_trait]
impl Channel for RabbitChannel {
    async fn declare_queue(&mut self, queue: &str) -> Result<String> {
        let payload = encode_fields(&[queue.as_bytes(), b"durable"]);
        self.core
            .request(self.generation, OP_DECLARE_QUEUE, payload)
            .await?;
        Ok(queue.to_string())
    }

    async fn bind_topic(&mut self, topic: &str, key: &str) -> Result<String> {
        let payload = encode_fields(&[topic.as_bytes(), key.as_bytes()]);
        let reply = self
            .core
            .request(self.generation, OP_BIND_TOPIC, payload)
            .await?;
        let fields = decode_fields(reply.payload)?;
        let generated = fields
            .first()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Broker("broker did not return a bound queue name".into()))?;
        Ok(String::from_utf8_lossy(generated).into_owned())
    }

    async fn publish(&mut self, destination: &Destination, message: &Message) -> Result<()> {
        let (exchange, routing_key) = match destination {
            Destination::Queue(queue) => ("", queue.as_str()),
            Destination::Topic { topic, key } => (topic.as_str(), key.as_str()),
        };
        let mode: &[u8] = match message.delivery_mode {
            DeliveryMode::Transient => b"1",
            DeliveryMode::Persistent => b"2",
        };
        let payload = encode_fields(&[
            exchange.as_bytes(),
            routing_key.as_bytes(),
            message.content_type.as_bytes(),
            mode,
            &message.payload,
        ]);
        self.core
            .request(self.generation, OP_PUBLISH, payload)
            .await?;
        tracing::debug!(target: "mqprobe::broker", destination = %destination, "message published");
        Ok(())
    }

    async fn fetch(&mut self, queue: &str) -> Result<Option<Bytes>> {
        let payload = encode_fields(&[queue.as_bytes()]);
        let reply = self.core.request(self.generation, OP_FETCH, payload).await?;
        match reply.op {
            RE_MSG => Ok(Some(reply.payload)),
            RE_EMPTY => Ok(None),
            other => Err(Error::Broker(format!("unexpected fetch reply op {other:#x}"))),
        }
    }

    fn is_open(&self) -> bool {
        self.core.is_live(self.generation)
    }
}
