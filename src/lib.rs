//! mqprobe – a toolkit for poking at message queues.
//!
//! This crate exports
//!  * `core`    – message, destination, error and output-buffer types
//!  * `broker`  – pluggable connection/producer/consumer abstraction
//!  * `service` – background consumer services with bounded managers
//!  * `plugin`  – ordered message-transform pipeline
//!  * `config`  – TOML-driven runtime configuration
//!
//! Downstream applications (the CLI, a web admin panel) drive brokers and
//! services through this library rather than talking to a broker client
//! directly.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod broker;
pub mod config;
pub mod core;
pub mod logging;
pub mod plugin;
pub mod service;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config};
pub use core::error::{Error, Result};
pub use core::message::{DeliveryMode, Destination, Message};
pub use core::output::{OutputBuffer, OutputEntry};
pub use service::{Service, ServiceManager, ServiceScopes, ServiceWrapper};
