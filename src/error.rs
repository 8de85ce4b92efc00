//! Error types for hpfeeds-client.

use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::Opcode;

/// Main error type for all feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Socket-level failure (connect refused, reset, broken pipe).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of publish fields or config parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer sent a frame that cannot be trusted (size limit, malformed payload).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// An outgoing message would exceed its opcode's size limit.
    #[error("{opcode:?} message of {len} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Opcode of the rejected message.
        opcode: Opcode,
        /// Total encoded length, header included.
        len: usize,
        /// Limit for that opcode.
        max: u32,
    },

    /// A file queued for streaming could not be opened or inspected.
    #[error("File error for {}: {source}", path.display())]
    File {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A file ended before the length announced in its PUBLISH header.
    #[error("File {} ended {missing} bytes short of its announced length", path.display())]
    TruncatedFile {
        /// Path being streamed.
        path: PathBuf,
        /// Bytes that could not be delivered.
        missing: u64,
    },

    /// The outbound queue reached its depth limit.
    #[error("Outbound queue full")]
    QueueFull,

    /// The connection task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Own-IP lookup failed.
    #[cfg(feature = "dynip")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FeedError {
    /// Shorthand for a protocol violation with a formatted reason.
    pub(crate) fn violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation(reason.into())
    }
}

/// Result type alias using FeedError.
pub type Result<T> = std::result::Result<T, FeedError>;
