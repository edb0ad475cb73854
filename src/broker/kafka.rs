//! Kafka-like broker variant.
//!
//! Only topic addressing exists here: queue destinations are rejected
//! rather than silently remapped. The reconnect schedule is the same one
//! the rabbit variant uses; there is no unretried fast path.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::{BrokerConfig, RetryConfig};
use crate::core::error::{Error, Result};
use crate::core::message::{Destination, Message};

use super::connection::ConnCore;
use super::wire::{encode_fields, OP_BIND_TOPIC, OP_FETCH, OP_PUBLISH, RE_EMPTY, RE_MSG};
use super::{BrokerKind, Channel, Connection};

pub struct KafkaConnection {
    core: Arc<ConnCore>,
}

impl KafkaConnection {
    pub fn new(config: Arc<BrokerConfig>, retry: RetryConfig) -> Self {
        Self {
            core: ConnCore::new(config, retry, "sasl-plain"),
        }
    }
}

#[async_trait]
impl Connection for KafkaConnection {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Kafka
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
        Ok(Box::new(KafkaChannel {
            generation: self.core.generation(),
            core: Arc::clone(&self.core),
        }))
    }
}

pub struct KafkaChannel {
    core: Arc<ConnCore>,
    generation: u64,
}

#[async_trait]
impl Channel for KafkaChannel {
    async fn declare_queue(&mut self, _queue: &str) -> Result<String> {
        Err(Error::InvalidDestination {
            reason: "kafka brokers have no queue addressing; use a topic and key".into(),
        })
    }

    async fn bind_topic(&mut self, topic: &str, key: &str) -> Result<String> {
        let payload = encode_fields(&[topic.as_bytes(), key.as_bytes()]);
        self.core
            .request(self.generation, OP_BIND_TOPIC, payload)
            .await?;
        // The subscription stream is polled under the topic name itself.
        Ok(topic.to_string())
    }

    async fn publish(&mut self, destination: &Destination, message: &Message) -> Result<()> {
        let Destination::Topic { topic, key } = destination else {
            return Err(Error::InvalidDestination {
                reason: "kafka publish requires a topic and key".into(),
            });
        };
        let payload = encode_fields(&[
            topic.as_bytes(),
            key.as_bytes(),
            message.content_type.as_bytes(),
            &message.payload,
        ]);
        self.core
            .request(self.generation, OP_PUBLISH, payload)
            .await?;
        tracing::debug!(target: "mqprobe::broker", destination = %destination, "message published");
        Ok(())
    }

    async fn fetch(&mut self, topic: &str) -> Result<Option<Bytes>> {
        let payload = encode_fields(&[topic.as_bytes()]);
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
