//! TOML-driven runtime configuration.
//!
//! One `[rabbit]` / `[kafka]` table per broker holds the connection
//! fields; `[retry]` and `[service]` tune the reconnect schedule and the
//! background-service limits. Broker configurations are immutable once a
//! connection holds them.

use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

use crate::core::error::{Error, Result};

/// Connection fields for a single broker instance.
///
/// `vhost` doubles as the namespace on brokers that have no virtual-host
/// concept. The `default_*` fields pre-fill destinations for UI/CLI
/// convenience and are not required.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BrokerConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub default_queue: Option<String>,
    #[serde(default)]
    pub default_topic: Option<String>,
    #[serde(default)]
    pub default_key: Option<String>,
}

impl BrokerConfig {
    /// Fails fast when a required connection field is missing or malformed.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config {
                reason: "broker host is not set".into(),
            });
        }
        if self.port == 0 {
            return Err(Error::Config {
                reason: "broker port is not set or not a valid port number".into(),
            });
        }
        if self.user.trim().is_empty() || self.password.is_empty() {
            return Err(Error::Config {
                reason: "broker credentials (user/password) are not set".into(),
            });
        }
        if self.vhost.trim().is_empty() {
            return Err(Error::Config {
                reason: "broker vhost/namespace is not set".into(),
            });
        }
        Ok(())
    }
}

/// Reconnect and polling schedule, applied uniformly to every broker kind.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RetryConfig {
    /// Connection attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubles on each subsequent attempt.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    /// Sleep between empty consumer polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_secs() -> u64 {
    2
}
fn default_poll_interval_secs() -> u64 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl RetryConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Delay to sleep after the given failed attempt (1-based).
    /// Exponential: base, base*2, base*4, ...
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_backoff() * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Limits for background consumer services.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ServiceConfig {
    /// Maximum concurrent consumer services per scope.
    #[serde(default = "default_max_consumers")]
    pub max_consumers: usize,
    /// Ring capacity of each service's output buffer.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_consumers == 0 {
            return Err(Error::Config {
                reason: "service max_consumers must be at least 1".into(),
            });
        }
        if self.buffer_capacity == 0 {
            return Err(Error::Config {
                reason: "service buffer_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn default_max_consumers() -> usize {
    5
}
fn default_buffer_capacity() -> usize {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_consumers: default_max_consumers(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub rabbit: BrokerConfig,
    #[serde(default)]
    pub kafka: BrokerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let raw: String = fs::read_to_string(path).map_err(|e| Error::Config {
        reason: format!("cannot read config file: {e}"),
    })?;
    let config: Config = toml::from_str(&raw).map_err(|e| Error::Config {
        reason: format!("cannot parse config file: {e}"),
    })?;
    // Broker tables are validated later, when one of them is selected.
    config.service.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BrokerConfig {
        BrokerConfig {
            host: "mq.example.net".into(),
            port: 5672,
            vhost: "/".into(),
            user: "guest".into(),
            password: "guest".into(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut c = valid();
        c.host.clear();
        assert!(matches!(c.validate(), Err(Error::Config { .. })));

        let mut c = valid();
        c.port = 0;
        assert!(matches!(c.validate(), Err(Error::Config { .. })));

        let mut c = valid();
        c.user.clear();
        assert!(matches!(c.validate(), Err(Error::Config { .. })));

        let mut c = valid();
        c.vhost.clear();
        assert!(matches!(c.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn validate_rejects_zero_service_limits() {
        let zero_buffer = ServiceConfig {
            max_consumers: 5,
            buffer_capacity: 0,
        };
        assert!(matches!(zero_buffer.validate(), Err(Error::Config { .. })));

        let zero_consumers = ServiceConfig {
            max_consumers: 0,
            buffer_capacity: 100,
        };
        assert!(matches!(zero_consumers.validate(), Err(Error::Config { .. })));

        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn backoff_schedule_doubles_from_base() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_after(1), Duration::from_secs(2));
        assert_eq!(retry.backoff_after(2), Duration::from_secs(4));
        assert_eq!(retry.backoff_after(3), Duration::from_secs(8));
    }

    #[test]
    fn load_config_rejects_zero_buffer_capacity() {
        let path = std::env::temp_dir().join("mqprobe-config-zero-buffer.toml");
        fs::write(&path, "[service]\nbuffer_capacity = 0\n").unwrap();
        let result = load_config(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn parses_toml_tables() {
        let cfg: Config = toml::from_str(
            r#"
            [rabbit]
            host = "127.0.0.1"
            port = 5672
            vhost = "/"
            user = "guest"
            password = "guest"
            default_queue = "inbox"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.rabbit.default_queue.as_deref(), Some("inbox"));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_backoff_secs, 2);
        assert_eq!(cfg.service.max_consumers, 5);
    }
}
