//! Error taxonomy for broker connections, destinations and services.
//!
//! Connection failures split into two classes: transient transport
//! trouble (`Connect`, retried with backoff before being surfaced) and
//! authorization rejection (`Auth`, surfaced immediately, never retried).
//! Both carry enough context to diagnose without leaking the password.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed connection configuration. Fatal; not retried.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// Transport could not be established after the bounded retry schedule.
    #[error("cannot connect to broker {host}:{port} after {attempts} attempt(s)")]
    Connect {
        host: String,
        port: u16,
        attempts: u32,
    },

    /// The broker rejected our credentials. Never retried.
    #[error("not authorized as user \"{user}\" at vhost \"{vhost}\" on broker {host}:{port}")]
    Auth {
        user: String,
        vhost: String,
        host: String,
        port: u16,
    },

    /// A channel was requested while disconnected and auto-reconnect is off.
    #[error("not connected to broker and auto-reconnect is disabled")]
    NotConnected,

    /// Neither a queue nor a full topic+key pair was supplied.
    #[error("invalid destination: {reason}")]
    InvalidDestination { reason: String },

    /// The per-scope concurrent consumer limit was hit.
    #[error("cannot start service: {limit} consumer service(s) already running")]
    CapacityExceeded { limit: usize },

    /// The factory was asked for a broker kind it cannot build.
    #[error("unsupported broker kind \"{kind}\"")]
    UnsupportedBroker { kind: String },

    /// An enabled transform name has no registered implementation.
    #[error("unknown transform \"{name}\"")]
    UnknownTransform { name: String },

    /// Every transform in the pipeline failed; nothing sendable remains.
    #[error("no transform produced a sendable message: {reason}")]
    TransformFailed { reason: String },

    /// Wire-level failure on an established transport.
    #[error("broker transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The broker answered with a protocol-level error.
    #[error("broker refused request: {0}")]
    Broker(String),
}
