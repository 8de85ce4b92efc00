//! Publisher builder and handle.
//!
//! The [`PublisherBuilder`] provides a fluent API for configuring the feed
//! connection. [`Publisher`] is the handle event sources talk to; the
//! connection itself lives in a background task that reconnects on its own.
//!
//! # Example
//!
//! ```no_run
//! use hpfeeds_client::channels::{ConnectionEvent, ConnectionKind, CONNECTION_CHANNEL};
//! use hpfeeds_client::Publisher;
//!
//! #[tokio::main]
//! async fn main() -> hpfeeds_client::Result<()> {
//!     let publisher = Publisher::builder()
//!         .server("hpfeeds.example.org")
//!         .port(10000)
//!         .ident("sensor-1")
//!         .secret("s3cret")
//!         .start()?;
//!
//!     publisher.publish(
//!         CONNECTION_CHANNEL,
//!         &ConnectionEvent {
//!             connection_type: ConnectionKind::Accept,
//!             connection_transport: "tcp".into(),
//!             connection_protocol: "smbd".into(),
//!             remote_host: "198.51.100.7".into(),
//!             remote_port: 49152,
//!             remote_hostname: String::new(),
//!             local_host: "192.0.2.10".into(),
//!             local_port: 445,
//!         },
//!     )?;
//!
//!     publisher.send_file("/var/lib/dionaea/binaries/d41d8cd9").await?;
//!     publisher.shutdown().await
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::codec::JsonCodec;
use crate::config::FeedConfig;
use crate::connection::driver::{self, Command};
use crate::connection::{ConnectionState, ConnectionStats, ConnectionStatus, FeedConnection};
use crate::error::{FeedError, Result};
use crate::protocol::encode_publish;

/// Builder for configuring and starting a [`Publisher`].
///
/// `server`, `ident` and `secret` have no usable defaults; everything else
/// does.
pub struct PublisherBuilder {
    config: FeedConfig,
}

impl PublisherBuilder {
    /// Create a builder with default tunables and no broker.
    pub fn new() -> Self {
        Self {
            config: FeedConfig::new("", crate::config::DEFAULT_PORT, "", ""),
        }
    }

    /// Broker host name or address.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    /// Broker port.
    ///
    /// Default: 10000
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Identity used in AUTH and every PUBLISH.
    pub fn ident(mut self, ident: impl Into<String>) -> Self {
        self.config.ident = ident.into();
        self
    }

    /// Shared secret for the AUTH digest.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = secret.into();
        self
    }

    /// Delay between a disconnect and the next attempt.
    ///
    /// Default: 10 seconds
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.config.reconnect_timeout = timeout;
        self
    }

    /// Channel that [`Publisher::send_file`] publishes to.
    ///
    /// Default: `mwbinary.dionaea.sensorunique`
    pub fn file_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.file_channel = channel.into();
        self
    }

    /// Bytes read from disk per streamed chunk.
    ///
    /// Default: 16 KiB
    pub fn file_chunk_size(mut self, size: usize) -> Self {
        self.config.file_chunk_size = size;
        self
    }

    /// Capacity of the command channel to the connection task.
    ///
    /// When it is full, publishes are dropped with a warning.
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Frames that may wait for authentication or a file transfer.
    ///
    /// Default: 4096
    pub fn max_queued_frames(mut self, limit: usize) -> Self {
        self.config.max_queued_frames = limit;
        self
    }

    /// Validate the configuration and spawn the connection task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<Publisher> {
        Publisher::start(self.config)
    }
}

impl Default for PublisherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running feed connection.
///
/// Dropping the handle stops the connection task as well; use
/// [`shutdown`](Self::shutdown) to wait for it.
pub struct Publisher {
    ident: Bytes,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    /// Publishes dropped because the command channel was full.
    dropped: AtomicU64,
    task: JoinHandle<()>,
}

impl Publisher {
    /// Create a new publisher builder.
    pub fn builder() -> PublisherBuilder {
        PublisherBuilder::new()
    }

    /// Start a publisher from a complete configuration.
    ///
    /// The first connection attempt starts right away. Must be called from
    /// within a tokio runtime.
    pub fn start(config: FeedConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let initial = FeedConnection::new(&config).status();
        let (status_tx, status_rx) = watch::channel(initial);
        let ident = Bytes::copy_from_slice(config.ident.as_bytes());

        let task = tokio::spawn(driver::run(config, rx, status_tx));

        Ok(Self {
            ident,
            commands: tx,
            status: status_rx,
            dropped: AtomicU64::new(0),
            task,
        })
    }

    /// Publish `fields` as a JSON object on `channel`.
    ///
    /// Fire-and-forget: `Ok(())` does not mean the broker received anything.
    /// Fails only when `fields` is not a JSON object or the connection task
    /// is gone.
    pub fn publish<T: Serialize + ?Sized>(&self, channel: &str, fields: &T) -> Result<()> {
        let body = JsonCodec::encode_fields(fields)?;
        self.publish_raw(channel, &body)
    }

    /// Publish an already encoded body on `channel`.
    ///
    /// A body that would push the message over the 1 MiB PUBLISH limit is
    /// counted as dropped and returned as [`FeedError::Oversized`]; the
    /// broker would close the connection over it.
    pub fn publish_raw(&self, channel: &str, data: &[u8]) -> Result<()> {
        let frame = match encode_publish(&self.ident, channel.as_bytes(), data) {
            Ok(frame) => frame,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel, len = data.len(), "dropping publish: {}", e);
                return Err(e);
            }
        };
        match self.commands.try_send(Command::Publish(frame)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel, "command channel full, dropping publish");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FeedError::ConnectionClosed),
        }
    }

    /// Stream the file at `path` on the configured file channel.
    ///
    /// The path is checked before anything is queued: a missing path or one
    /// that is not a regular file is returned as [`FeedError::File`].
    /// Waits for room in the command channel instead of dropping.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| FeedError::File {
                path: path.to_path_buf(),
                source,
            })?;
        if !metadata.is_file() {
            return Err(FeedError::File {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a regular file",
                ),
            });
        }

        self.commands
            .send(Command::SendFile(path.to_path_buf()))
            .await
            .map_err(|_| FeedError::ConnectionClosed)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Whether a TCP connection to the broker is up.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Established | ConnectionState::Authenticated
        )
    }

    /// Whether AUTH has been sent on the current connection.
    pub fn is_authenticated(&self) -> bool {
        self.state() == ConnectionState::Authenticated
    }

    /// Lifetime counters, including publishes dropped at this handle.
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = self.status.borrow().stats;
        stats.dropped += self.dropped.load(Ordering::Relaxed);
        stats
    }

    /// Watch connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Close the connection and wait for the task to stop.
    ///
    /// Anything still queued is discarded.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task is already on its way out.
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|e| {
            tracing::error!("connection task failed: {}", e);
            FeedError::ConnectionClosed
        })
    }
}
