//! Polling consumer with cooperative cancellation.
//!
//! The consume loop binds its destination, then fetches one message at a
//! time with auto-ack semantics. Callback failures are logged and the
//! loop keeps going; a single malformed message must not kill an
//! otherwise healthy consumer. Cancellation is checked at every
//! iteration boundary and the empty-queue sleep races against it, so a
//! stop request is observed within one poll interval.

use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::Result;
use crate::core::message::Destination;

use super::Connection;

pub struct Consumer {
    conn: Arc<dyn Connection>,
    cancel: CancellationToken,
}

impl Consumer {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            cancel: CancellationToken::new(),
        }
    }

    /// Requests a cooperative stop. The in-flight fetch is not
    /// interrupted; the loop exits at its next boundary.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Consumes from `destination`, invoking `callback` for each message
    /// body.
    ///
    /// With `stop_signal` supplied the loop runs until that token (or
    /// this consumer's own [`stop`](Self::stop)) fires; without one, a
    /// single fetch iteration is performed and the call returns.
    pub async fn consume<F>(
        &self,
        destination: &Destination,
        mut callback: F,
        stop_signal: Option<CancellationToken>,
    ) -> Result<()>
    where
        F: FnMut(Bytes) -> anyhow::Result<()> + Send,
    {
        let mut channel = self.conn.open_channel().await?;

        // Idle → Bound: resolve the destination to a pollable queue.
        let queue = match destination {
            Destination::Queue(queue) => channel.declare_queue(queue).await?,
            Destination::Topic { topic, key } => channel.bind_topic(topic, key).await?,
        };
        debug!(target: "mqprobe::consumer", destination = %destination, queue = %queue, "consuming");

        let poll_interval = self.conn.retry().poll_interval();
        loop {
            let fetched = channel.fetch(&queue).await?;
            let got_message = fetched.is_some();
            if let Some(body) = fetched {
                if let Err(err) = callback(body) {
                    warn!(
                        target: "mqprobe::consumer",
                        queue = %queue,
                        error = %err,
                        "message callback failed; continuing"
                    );
                }
            }

            let Some(stop_signal) = &stop_signal else {
                // Single-shot consume.
                break;
            };
            if stop_signal.is_cancelled() || self.cancel.is_cancelled() {
                break;
            }
            if !got_message {
                tokio::select! {
                    _ = stop_signal.cancelled() => break,
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }

        debug!(target: "mqprobe::consumer", queue = %queue, "consumer stopped");
        Ok(())
    }
}
