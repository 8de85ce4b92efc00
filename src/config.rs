//! Connection configuration.
//!
//! A [`FeedConfig`] can be built in code or loaded from JSON. Numeric
//! settings are read leniently, the way sensor config files tend to be
//! written: `"port": "10000"` works as well as `"port": 10000`, and a value
//! that cannot be parsed falls back to its default with a warning.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::channels::UNIQUE_CHANNEL;
use crate::error::{FeedError, Result};

/// Default broker port.
pub const DEFAULT_PORT: u16 = 10000;

/// Default delay between a disconnect and the next connection attempt.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read size while streaming files.
pub const DEFAULT_FILE_CHUNK_SIZE: usize = 16 * 1024;

/// Default capacity of the publisher's command channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Settings for one feed connection.
#[derive(Clone, Deserialize)]
pub struct FeedConfig {
    /// Broker host name or address.
    pub server: String,
    /// Broker port.
    #[serde(default = "default_port", deserialize_with = "lenient_port")]
    pub port: u16,
    /// Identity announced in AUTH and every PUBLISH.
    pub ident: String,
    /// Shared secret used for the AUTH digest.
    pub secret: String,
    /// Delay before reconnecting, given in (fractional) seconds.
    #[serde(
        default = "default_reconnect_timeout",
        deserialize_with = "lenient_seconds"
    )]
    pub reconnect_timeout: Duration,
    /// Channel that streamed files are published to.
    #[serde(default = "default_file_channel")]
    pub file_channel: String,
    /// Bytes read from disk per streamed chunk.
    #[serde(default = "default_file_chunk_size")]
    pub file_chunk_size: usize,
    /// Commands buffered between the publisher and the connection task.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Frames that may wait for authentication or a transfer to finish.
    #[serde(default = "default_max_queued_frames")]
    pub max_queued_frames: usize,
}

impl FeedConfig {
    /// Configuration with default tunables.
    pub fn new(
        server: impl Into<String>,
        port: u16,
        ident: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            ident: ident.into(),
            secret: secret.into(),
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            file_channel: default_file_channel(),
            file_chunk_size: DEFAULT_FILE_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_queued_frames: crate::queue::DEFAULT_MAX_QUEUED,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the connection cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(FeedError::Config("server must not be empty".into()));
        }
        if self.ident.is_empty() {
            return Err(FeedError::Config("ident must not be empty".into()));
        }
        if self.ident.len() > crate::protocol::MAX_PREFIXED_LEN {
            return Err(FeedError::Config(format!(
                "ident is {} bytes, at most {} fit the wire format",
                self.ident.len(),
                crate::protocol::MAX_PREFIXED_LEN
            )));
        }
        if self.file_chunk_size == 0 {
            return Err(FeedError::Config("file_chunk_size must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(FeedError::Config("channel_capacity must be positive".into()));
        }
        Ok(())
    }

    /// `host:port` for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("ident", &self.ident)
            .field("secret", &"<redacted>")
            .field("reconnect_timeout", &self.reconnect_timeout)
            .field("file_channel", &self.file_channel)
            .field("file_chunk_size", &self.file_chunk_size)
            .field("channel_capacity", &self.channel_capacity)
            .field("max_queued_frames", &self.max_queued_frames)
            .finish()
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_reconnect_timeout() -> Duration {
    DEFAULT_RECONNECT_TIMEOUT
}

fn default_file_channel() -> String {
    UNIQUE_CHANNEL.to_string()
}

fn default_file_chunk_size() -> usize {
    DEFAULT_FILE_CHUNK_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_max_queued_frames() -> usize {
    crate::queue::DEFAULT_MAX_QUEUED
}

/// Read a number given either as a JSON number or as a numeric string.
fn number_like<T: FromStr>(value: &Value) -> Option<T> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(DEFAULT_PORT);
    }
    Ok(number_like(&value).unwrap_or_else(|| {
        tracing::warn!("Unable to convert value '{}' for port to int", value);
        DEFAULT_PORT
    }))
}

fn lenient_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(DEFAULT_RECONNECT_TIMEOUT);
    }
    match number_like::<f64>(&value) {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => {
            tracing::warn!(
                "Unable to convert value '{}' for reconnect timeout to float",
                value
            );
            Ok(DEFAULT_RECONNECT_TIMEOUT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = FeedConfig::from_json(
            r#"{"server": "hpfeeds.example.org", "ident": "sensor", "secret": "s3cret"}"#,
        )
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.reconnect_timeout, DEFAULT_RECONNECT_TIMEOUT);
        assert_eq!(config.file_channel, UNIQUE_CHANNEL);
        assert_eq!(config.file_chunk_size, DEFAULT_FILE_CHUNK_SIZE);
        assert_eq!(config.address(), "hpfeeds.example.org:10000");
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let config = FeedConfig::from_json(
            r#"{"server": "h", "ident": "i", "secret": "s",
                "port": "20000", "reconnect_timeout": "2.5"}"#,
        )
        .unwrap();

        assert_eq!(config.port, 20000);
        assert_eq!(config.reconnect_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = FeedConfig::from_json(
            r#"{"server": "h", "ident": "i", "secret": "s",
                "port": "tenthousand", "reconnect_timeout": -3}"#,
        )
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.reconnect_timeout, DEFAULT_RECONNECT_TIMEOUT);
    }

    #[test]
    fn test_null_values_use_defaults() {
        let config = FeedConfig::from_json(
            r#"{"server": "h", "ident": "i", "secret": "s",
                "port": null, "reconnect_timeout": null}"#,
        )
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.reconnect_timeout, DEFAULT_RECONNECT_TIMEOUT);
    }

    #[test]
    fn test_missing_server_rejected() {
        assert!(FeedConfig::from_json(r#"{"ident": "i", "secret": "s"}"#).is_err());
        assert!(FeedConfig::from_json(r#"{"server": " ", "ident": "i", "secret": "s"}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_tunables() {
        let mut config = FeedConfig::new("h", 1, "i", "s");
        assert!(config.validate().is_ok());

        config.file_chunk_size = 0;
        assert!(matches!(config.validate(), Err(FeedError::Config(_))));

        let config = FeedConfig::new("h", 1, "i".repeat(256), "s");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = FeedConfig::new("h", 1, "i", "hunter2");
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
