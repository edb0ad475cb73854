//! Fire-and-forget message publishing.

use std::sync::Arc;

use crate::core::error::Result;
use crate::core::message::{Destination, Message};

use super::{Channel, Connection};

/// Sends single messages over a channel obtained from its connection.
///
/// The channel is opened lazily and reopened when the connection has
/// invalidated it; no acknowledgment is awaited at this layer.
pub struct Producer {
    conn: Arc<dyn Connection>,
    channel: Option<Box<dyn Channel>>,
}

impl Producer {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            channel: None,
        }
    }

    pub async fn produce(&mut self, message: &Message, destination: &Destination) -> Result<()> {
        let channel = self.channel_mut().await?;
        channel.publish(destination, message).await
    }

    async fn channel_mut(&mut self) -> Result<&mut Box<dyn Channel>> {
        let stale = !matches!(&self.channel, Some(ch) if ch.is_open());
        if stale {
            self.channel = Some(self.conn.open_channel().await?);
        }
        self.channel
            .as_mut()
            .ok_or(crate::core::error::Error::NotConnected)
    }
}
