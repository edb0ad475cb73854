//! Shared connection state for the broker variants.
//!
//! Both variants keep at most one live [`Transport`] per connection and
//! route every channel request through it. Disconnecting bumps the
//! generation counter, which is how previously issued channels learn they
//! have been invalidated.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{BrokerConfig, RetryConfig};
use crate::core::error::{Error, Result};

use super::wire::{dial_with_retry, Frame, Transport};

pub(crate) struct ConnCore {
    pub(crate) config: Arc<BrokerConfig>,
    pub(crate) retry: RetryConfig,
    /// Handshake mechanism name sent to the broker ("vhost-plain" for the
    /// rabbit variant, "sasl-plain" for kafka).
    mechanism: &'static str,
    auto_reconnect: AtomicBool,
    transport: Mutex<Option<Transport>>,
    connected: AtomicBool,
    generation: AtomicU64,
}

impl ConnCore {
    pub(crate) fn new(
        config: Arc<BrokerConfig>,
        retry: RetryConfig,
        mechanism: &'static str,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            retry,
            mechanism,
            auto_reconnect: AtomicBool::new(true),
            transport: Mutex::new(None),
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    pub(crate) fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// True while the channel's generation still refers to a live transport.
    pub(crate) fn is_live(&self, channel_generation: u64) -> bool {
        self.connected.load(Ordering::SeqCst) && self.generation() == channel_generation
    }

    /// Idempotent: a no-op when a transport is already live.
    pub(crate) async fn connect(&self) -> Result<()> {
        let mut guard = self.transport.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.establish().await?);
        self.connected.store(true, Ordering::SeqCst);
        debug!(
            target: "mqprobe::broker",
            host = %self.config.host,
            port = self.config.port,
            "connected"
        );
        Ok(())
    }

    /// Idempotent; never fails on an already-disconnected connection.
    pub(crate) async fn disconnect(&self) {
        let mut guard = self.transport.lock().await;
        if guard.take().is_some() {
            self.connected.store(false, Ordering::SeqCst);
            self.generation.fetch_add(1, Ordering::SeqCst);
            debug!(
                target: "mqprobe::broker",
                host = %self.config.host,
                "disconnected"
            );
        }
    }

    /// Brings up the transport for a new channel. Reconnects when
    /// auto-reconnect is on; otherwise a missing transport is an error.
    pub(crate) async fn ensure_connected(&self) -> Result<()> {
        let mut guard = self.transport.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        if !self.auto_reconnect() {
            return Err(Error::NotConnected);
        }
        *guard = Some(self.establish().await?);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// One request/reply exchange on the shared transport, applying the
    /// reconnect policy when the transport is absent and dropping it when
    /// the wire fails mid-request.
    pub(crate) async fn request(&self, channel_generation: u64, op: u8, payload: Bytes) -> Result<Frame> {
        if self.generation() != channel_generation {
            return Err(Error::NotConnected);
        }
        let mut guard = self.transport.lock().await;
        if guard.is_none() {
            if !self.auto_reconnect() {
                return Err(Error::NotConnected);
            }
            *guard = Some(self.establish().await?);
            self.connected.store(true, Ordering::SeqCst);
        }
        let transport = guard.as_mut().ok_or(Error::NotConnected)?;
        match transport.request(op, payload).await {
            Ok(frame) => Ok(frame),
            Err(Error::Transport(err)) => {
                // Broken pipe: drop the transport so the next request redials.
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
                Err(Error::Transport(err))
            }
            Err(other) => Err(other),
        }
    }

    async fn establish(&self) -> Result<Transport> {
        let config = Arc::clone(&self.config);
        let mechanism = self.mechanism;
        dial_with_retry(self.config.as_ref(), &self.retry, self.auto_reconnect(), move || {
            let config = Arc::clone(&config);
            async move {
                let mut transport = Transport::dial(&config.host, config.port).await?;
                transport
                    .authenticate(mechanism, &config.user, &config.password, &config.vhost)
                    .await?;
                Ok(transport)
            }
        })
        .await
    }
}
