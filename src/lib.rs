//! # hpfeeds-client
//!
//! Reconnecting publisher for the hpfeeds telemetry protocol, as used by
//! honeypot sensors to ship events and captured binaries to a broker.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): 5-byte header framing, message encoders and
//!   an incremental unpacker with per-opcode size limits
//! - **Connection** ([`connection`]): state machine, AUTH handshake,
//!   outbound queue and chunked file streaming, run by one background task
//! - **Publisher** ([`Publisher`]): the handle event sources use
//!
//! ## Example
//!
//! ```no_run
//! use hpfeeds_client::Publisher;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> hpfeeds_client::Result<()> {
//!     let publisher = Publisher::builder()
//!         .server("hpfeeds.example.org")
//!         .ident("sensor-1")
//!         .secret("s3cret")
//!         .start()?;
//!
//!     publisher.publish("dionaea.shellcodeprofiles", &json!({"profile": "[]"}))?;
//!     publisher.shutdown().await
//! }
//! ```

pub mod channels;
pub mod codec;
pub mod config;
pub mod connection;
#[cfg(feature = "dynip")]
pub mod dynip;
pub mod error;
pub mod protocol;
pub mod queue;

mod publisher;

pub use config::FeedConfig;
pub use connection::{ConnectionState, ConnectionStats, ConnectionStatus, FeedConnection};
pub use error::{FeedError, Result};
pub use publisher::{Publisher, PublisherBuilder};
