//! Consumer-as-a-service: connects, polls a destination into the output
//! buffer until stopped, then disconnects.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broker::{Connection, Consumer};
use crate::core::message::Destination;
use crate::core::output::OutputBuffer;

use super::Service;

pub struct ConsumeService {
    conn: Arc<dyn Connection>,
    destination: Destination,
    name: String,
}

impl ConsumeService {
    pub fn new(conn: Arc<dyn Connection>, destination: Destination) -> Self {
        let name = format!("{} consumer, {}", conn.kind(), destination);
        Self {
            conn,
            destination,
            name,
        }
    }
}

#[async_trait]
impl Service for ConsumeService {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn run(
        &self,
        output: Arc<OutputBuffer>,
        stop_signal: CancellationToken,
    ) -> anyhow::Result<()> {
        output.write("[*] Waiting for messages.");
        self.conn.connect().await?;

        let consumer = Consumer::new(Arc::clone(&self.conn));
        let sink = Arc::clone(&output);
        let callback = move |body: Bytes| {
            // JSON bodies are re-serialized compactly; anything else is
            // captured as lossy text.
            let line = match serde_json::from_slice::<serde_json::Value>(&body) {
                Ok(value) => value.to_string(),
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            debug!(target: "mqprobe::service", message = %line, "received message");
            sink.write(line);
            Ok(())
        };

        let result = consumer
            .consume(&self.destination, callback, Some(stop_signal))
            .await;

        output.write("[*] Consumer quit.");
        self.conn.disconnect().await?;
        result?;
        Ok(())
    }
}
