//! Minimal framed transport used by the broker variants.
//!
//! Frames are `4-byte BE length | 1-byte op | payload`; a payload is a
//! sequence of length-prefixed fields so message bodies can carry any
//! bytes. The exact encoding is private to this crate — callers only see
//! the [`Channel`](super::Channel) capability.
//!
//! This module also hosts the shared dial-with-retry helper so the
//! rabbit and kafka paths follow one schedule.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::future::Future;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

use crate::config::{BrokerConfig, RetryConfig};
use crate::core::error::{Error, Result};

// Client → broker ops.
pub const OP_AUTH: u8 = 0x01;
pub const OP_DECLARE_QUEUE: u8 = 0x02;
pub const OP_BIND_TOPIC: u8 = 0x03;
pub const OP_PUBLISH: u8 = 0x04;
pub const OP_FETCH: u8 = 0x05;

// Broker → client replies.
pub const RE_OK: u8 = 0x10;
pub const RE_ERR: u8 = 0x11;
pub const RE_DENIED: u8 = 0x12;
pub const RE_MSG: u8 = 0x13;
pub const RE_EMPTY: u8 = 0x14;

const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Frame {
    pub op: u8,
    pub payload: Bytes,
}

pub fn encode_fields(fields: &[&[u8]]) -> Bytes {
    let total: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut buf = BytesMut::with_capacity(total);
    for field in fields {
        buf.put_u32(field.len() as u32);
        buf.extend_from_slice(field);
    }
    buf.freeze()
}

pub fn decode_fields(mut payload: Bytes) -> Result<Vec<Bytes>> {
    let mut fields = Vec::new();
    while payload.has_remaining() {
        if payload.remaining() < 4 {
            return Err(Error::Broker("truncated field header".into()));
        }
        let len = payload.get_u32() as usize;
        if payload.remaining() < len {
            return Err(Error::Broker("truncated field body".into()));
        }
        fields.push(payload.split_to(len));
    }
    Ok(fields)
}

/// Why a dial attempt failed; decides whether the retry loop continues.
#[derive(Debug)]
pub enum DialError {
    /// Transport-level trouble (refused, reset, timed out). Retryable.
    Transient(io::Error),
    /// The broker rejected the credentials. Not retryable.
    Denied,
}

impl From<io::Error> for DialError {
    fn from(err: io::Error) -> Self {
        DialError::Transient(err)
    }
}

/// Runs `dial` until it succeeds, the broker denies us, or the retry
/// schedule is exhausted. Backoff starts at the configured base interval
/// and doubles after each failed attempt. With `auto_reconnect` off the
/// first transient failure is final.
pub async fn dial_with_retry<T, F, Fut>(
    config: &BrokerConfig,
    retry: &RetryConfig,
    auto_reconnect: bool,
    mut dial: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, DialError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match dial().await {
            Ok(transport) => return Ok(transport),
            Err(DialError::Denied) => {
                return Err(Error::Auth {
                    user: config.user.clone(),
                    vhost: config.vhost.clone(),
                    host: config.host.clone(),
                    port: config.port,
                });
            }
            Err(DialError::Transient(err)) => {
                if attempt >= retry.max_attempts || !auto_reconnect {
                    return Err(Error::Connect {
                        host: config.host.clone(),
                        port: config.port,
                        attempts: attempt,
                    });
                }
                let delay = retry.backoff_after(attempt);
                warn!(
                    target: "mqprobe::broker",
                    host = %config.host,
                    port = config.port,
                    %err,
                    "connection attempt {attempt} failed; retrying in {}s",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One authenticated TCP transport to a broker instance.
#[derive(Debug)]
pub struct Transport {
    stream: TcpStream,
}

impl Transport {
    pub async fn dial(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Sends the auth handshake. `mechanism` distinguishes the vhost-style
    /// login from the SASL-style one; the broker answers `RE_OK` or
    /// `RE_DENIED`.
    pub async fn authenticate(
        &mut self,
        mechanism: &str,
        user: &str,
        password: &str,
        namespace: &str,
    ) -> std::result::Result<(), DialError> {
        let payload = encode_fields(&[
            mechanism.as_bytes(),
            user.as_bytes(),
            password.as_bytes(),
            namespace.as_bytes(),
        ]);
        let reply = self
            .roundtrip(OP_AUTH, payload)
            .await
            .map_err(io::Error::other)?;
        match reply.op {
            RE_OK => Ok(()),
            RE_DENIED => Err(DialError::Denied),
            _ => Err(DialError::Transient(io::Error::other(
                "unexpected handshake reply",
            ))),
        }
    }

    /// Writes one request frame and reads the broker's reply. `RE_ERR`
    /// replies surface as `Error::Broker`.
    pub async fn request(&mut self, op: u8, payload: Bytes) -> Result<Frame> {
        let reply = self.roundtrip(op, payload).await?;
        if reply.op == RE_ERR {
            let text = String::from_utf8_lossy(&reply.payload).into_owned();
            return Err(Error::Broker(text));
        }
        Ok(reply)
    }

    async fn roundtrip(&mut self, op: u8, payload: Bytes) -> Result<Frame> {
        self.write_frame(op, &payload).await?;
        self.read_frame().await
    }

    async fn write_frame(&mut self, op: u8, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(4 + 1 + payload.len());
        buf.put_u32((1 + payload.len()) as u32);
        buf.put_u8(op);
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let len = self.stream.read_u32().await? as usize;
        if len == 0 || len > MAX_FRAME_BYTES {
            return Err(Error::Broker(format!("invalid frame length {len}")));
        }
        let op = self.stream.read_u8().await?;
        let mut payload = vec![0u8; len - 1];
        self.stream.read_exact(&mut payload).await?;
        Ok(Frame {
            op,
            payload: Bytes::from(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn test_config() -> BrokerConfig {
        BrokerConfig {
            host: "broker.test".into(),
            port: 5672,
            vhost: "/".into(),
            user: "guest".into(),
            password: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn field_codec_round_trips() {
        let payload = encode_fields(&[b"inbox", b"", b"\x00\xff binary"]);
        let fields = decode_fields(payload).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(&fields[0][..], b"inbox");
        assert!(fields[1].is_empty());
        assert_eq!(&fields[2][..], b"\x00\xff binary");
    }

    #[test]
    fn truncated_fields_are_rejected() {
        let mut raw = BytesMut::new();
        raw.put_u32(10);
        raw.extend_from_slice(b"short");
        assert!(matches!(
            decode_fields(raw.freeze()),
            Err(Error::Broker(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_schedule_is_bounded_and_backs_off() {
        let config = test_config();
        let retry = RetryConfig::default();
        let attempts = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let result: Result<()> = dial_with_retry(&config, &retry, true, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DialError::Transient(io::Error::other("refused"))) }
        })
        .await;

        match result {
            Err(Error::Connect { attempts: n, .. }) => assert_eq!(n, 3),
            other => panic!("expected Connect error, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Two sleeps between three attempts: base + base*2.
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn denied_is_not_retried() {
        let config = test_config();
        let retry = RetryConfig::default();
        let attempts = AtomicU32::new(0);

        let result: Result<()> = dial_with_retry(&config, &retry, true, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DialError::Denied) }
        })
        .await;

        match result {
            Err(Error::Auth { user, vhost, .. }) => {
                assert_eq!(user, "guest");
                assert_eq!(vhost, "/");
            }
            other => panic!("expected Auth error, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_reconnect_off_fails_on_first_transient_error() {
        let config = test_config();
        let retry = RetryConfig::default();
        let attempts = AtomicU32::new(0);

        let result: Result<()> = dial_with_retry(&config, &retry, false, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DialError::Transient(io::Error::other("refused"))) }
        })
        .await;

        assert!(matches!(result, Err(Error::Connect { attempts: 1, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let config = test_config();
        let retry = RetryConfig {
            base_backoff_secs: 0,
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);

        let result = dial_with_retry(&config, &retry, true, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DialError::Transient(io::Error::other("flaky")))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
