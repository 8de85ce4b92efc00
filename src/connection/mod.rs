//! Feed connection state machine.
//!
//! [`FeedConnection`] holds everything one broker session needs: the
//! connection state, the inbound [`Unpacker`], the outbound queue and the
//! file-transfer cursor. It performs no socket I/O itself. The driver in
//! [`driver`] feeds it inbound bytes and commands, and writes whatever
//! [`FeedConnection::next_transmit`] hands back.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐ TCP up ┌─────────────┐ INFO ┌───────────────┐
//! │ Disconnected │────────>│ Connecting │───────>│ Established │─────>│ Authenticated │
//! └──────────────┘         └────────────┘        └─────────────┘      └───────────────┘
//!        ^                        │                     │                     │
//!        └────────────────────────┴─────────────────────┴─────────────────────┘
//!                              error / disconnect / violation
//! ```
//!
//! Authentication is optimistic: the protocol has no success reply, so the
//! connection counts as authenticated as soon as AUTH is queued. A wrong
//! secret only shows up as the broker closing the socket.
//!
//! # Ordering
//!
//! - Publishes and files share one queue and leave in the order they were
//!   submitted.
//! - A file's bytes are never interleaved with anything else.
//! - Files requested while another is streaming follow it immediately,
//!   ahead of the publishes that transfer held back.

pub(crate) mod driver;
mod transfer;

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::Bytes;

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::protocol::{encode_auth, Message, Unpacker, HEADER_SIZE, MAX_BUFFER};
use crate::queue::{Outbound, OutboundQueue};
use transfer::FileTransfer;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; waiting for the reconnect timer.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Socket up, waiting for the broker's INFO.
    Established,
    /// AUTH sent; publishes go straight to the wire.
    Authenticated,
}

impl ConnectionState {
    /// Allowed transitions. Any state may fall back to `Disconnected`, and
    /// the reconnect timer may start a new attempt from any state.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::{Authenticated, Connecting, Disconnected, Established};
        matches!(
            (self, next),
            (_, Disconnected)
                | (_, Connecting)
                | (Connecting, Established)
                | (Established, Authenticated)
                | (Authenticated, Authenticated)
        )
    }
}

/// Inbound bytes held back while a file streams: one largest frame plus the
/// start of the next.
const MAX_STREAMING_BACKLOG: usize = 2 * (HEADER_SIZE + MAX_BUFFER as usize);

/// Counters kept across reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Complete frames and file headers handed to the socket.
    pub frames_sent: u64,
    /// Bytes written to the socket, file bodies included.
    pub bytes_sent: u64,
    /// Files streamed to completion.
    pub files_sent: u64,
    /// Frames and files discarded (full queue, disconnects, unreadable files).
    pub dropped: u64,
    /// Successful TCP connects.
    pub connects: u64,
}

/// Point-in-time view of a connection, published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Whether a file currently owns the wire.
    pub streaming: bool,
    /// Publishes and files waiting in the outbound queue.
    pub queued: usize,
    /// Lifetime counters.
    pub stats: ConnectionStats,
}

/// Protocol state of one feed client.
#[derive(Debug)]
pub struct FeedConnection {
    ident: Bytes,
    secret: Bytes,
    file_channel: Bytes,
    chunk_size: usize,
    state: ConnectionState,
    unpacker: Unpacker,
    /// Frames committed to the socket, in order.
    wire: VecDeque<Bytes>,
    /// Publishes and files deferred until authenticated and idle.
    queue: OutboundQueue,
    transfer: Option<FileTransfer>,
    stats: ConnectionStats,
}

impl FeedConnection {
    /// Create a disconnected client for `config`.
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            ident: Bytes::copy_from_slice(config.ident.as_bytes()),
            secret: Bytes::copy_from_slice(config.secret.as_bytes()),
            file_channel: Bytes::copy_from_slice(config.file_channel.as_bytes()),
            chunk_size: config.file_chunk_size,
            state: ConnectionState::Disconnected,
            unpacker: Unpacker::new(),
            wire: VecDeque::new(),
            queue: OutboundQueue::new(config.max_queued_frames),
            transfer: None,
            stats: ConnectionStats::default(),
        }
    }

    /// Get current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether AUTH has been sent on the current socket.
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Whether a file transfer owns the wire.
    pub fn is_streaming(&self) -> bool {
        self.transfer.is_some()
    }

    /// Identity used for AUTH and PUBLISH.
    pub fn ident(&self) -> &Bytes {
        &self.ident
    }

    /// Lifetime counters.
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Snapshot for observers.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            streaming: self.is_streaming(),
            queued: self.queue.len(),
            stats: self.stats,
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(FeedError::violation(format!(
                "illegal transition {:?} -> {:?}",
                self.state, next
            )));
        }
        tracing::debug!(from = ?self.state, to = ?next, "state change");
        self.state = next;
        Ok(())
    }

    /// A connection attempt is starting.
    pub fn begin_connect(&mut self) -> Result<()> {
        self.transition(ConnectionState::Connecting)
    }

    /// The transport reported the socket as connected.
    pub fn on_established(&mut self) -> Result<()> {
        self.transition(ConnectionState::Established)?;
        self.stats.connects += 1;
        tracing::debug!("socket established");
        Ok(())
    }

    /// Whether [`next_transmit`](Self::next_transmit) may produce bytes.
    pub fn has_transmit(&self) -> bool {
        !self.wire.is_empty()
            || (self.is_authenticated() && (self.transfer.is_some() || !self.queue.is_empty()))
    }

    /// Accept bytes read from the socket.
    ///
    /// Frames are only interpreted while no file is streaming; otherwise
    /// they wait in the unpacker until the transfer ends. An oversized
    /// frame is reported as a violation either way, and so is a backlog
    /// of more than two maximum-size frames during a transfer.
    pub fn handle_inbound(&mut self, data: &[u8]) -> Result<()> {
        self.unpacker.feed(data);
        if self.is_streaming() {
            self.unpacker.check_pending()?;
            if self.unpacker.len() > MAX_STREAMING_BACKLOG {
                return Err(FeedError::violation(format!(
                    "{} inbound bytes buffered while streaming a file",
                    self.unpacker.len()
                )));
            }
            return Ok(());
        }
        self.process_frames()
    }

    fn process_frames(&mut self) -> Result<()> {
        while let Some(frame) = self.unpacker.next_frame()? {
            match Message::decode(&frame)? {
                Message::Info { name, nonce } => {
                    tracing::debug!(
                        server = %String::from_utf8_lossy(&name),
                        nonce = %hex::encode(&nonce),
                        "broker info"
                    );
                    let auth = encode_auth(&nonce, &self.ident, &self.secret)?;
                    self.transition(ConnectionState::Authenticated)?;
                    self.wire.push_back(auth);
                    tracing::info!(
                        broker = %String::from_utf8_lossy(&name),
                        "authenticated"
                    );
                }
                Message::Publish {
                    ident,
                    channel,
                    data,
                } => {
                    tracing::debug!(
                        channel = %String::from_utf8_lossy(&channel),
                        ident = %String::from_utf8_lossy(&ident),
                        len = data.len(),
                        "publish from broker"
                    );
                }
                Message::Error(message) => {
                    tracing::warn!(
                        "error message from broker: {}",
                        String::from_utf8_lossy(&message)
                    );
                }
                other => {
                    tracing::debug!(opcode = ?frame.opcode, message = ?other, "unexpected message");
                }
            }
        }
        Ok(())
    }

    /// Send or defer an encoded PUBLISH frame.
    pub fn publish_frame(&mut self, frame: Bytes) {
        if self.is_idle() {
            self.wire.push_back(frame);
            return;
        }
        if self.queue.push(Outbound::Frame(frame)).is_err() {
            self.stats.dropped += 1;
            tracing::warn!(
                limit = self.queue.max_pending(),
                "outbound queue full, dropping publish"
            );
        }
    }

    /// Stream a file now, or queue it behind the current work.
    ///
    /// A file requested during a transfer is chained right after it. Errors
    /// opening a file that starts immediately are returned; a queued file
    /// that cannot be opened when its turn comes is logged and skipped.
    pub async fn send_file(&mut self, path: PathBuf) -> Result<()> {
        if self.is_idle() {
            let (transfer, header) =
                FileTransfer::open(path, &self.ident, &self.file_channel, self.chunk_size)
                    .await?;
            self.begin_transfer(transfer, header);
            return Ok(());
        }

        tracing::debug!(path = %path.display(), chained = self.is_streaming(), "file queued");
        let queued = if self.is_streaming() {
            self.queue.push_chained(path)
        } else {
            self.queue.push(Outbound::File(path))
        };
        if queued.is_err() {
            self.stats.dropped += 1;
            tracing::warn!(
                limit = self.queue.max_pending(),
                "outbound queue full, dropping file"
            );
        }
        Ok(())
    }

    /// Authenticated with nothing streaming or waiting.
    fn is_idle(&self) -> bool {
        self.is_authenticated() && self.transfer.is_none() && self.queue.is_empty()
    }

    fn begin_transfer(&mut self, transfer: FileTransfer, header: Bytes) {
        tracing::debug!(
            path = %transfer.path().display(),
            size = transfer.size(),
            "streaming file"
        );
        self.wire.push_back(header);
        self.transfer = Some(transfer);
    }

    /// Open a queued file. Returns whether it started.
    async fn start_queued_file(&mut self, path: PathBuf) -> bool {
        match FileTransfer::open(path, &self.ident, &self.file_channel, self.chunk_size).await {
            Ok((transfer, header)) => {
                self.begin_transfer(transfer, header);
                true
            }
            Err(e) => {
                self.stats.dropped += 1;
                tracing::warn!("skipping queued file: {}", e);
                false
            }
        }
    }

    /// Produce the next bytes to write, in wire order.
    ///
    /// Returns `Ok(None)` when nothing may be sent right now. Errors mean the
    /// connection has to be torn down.
    pub async fn next_transmit(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.wire.pop_front() {
                self.stats.frames_sent += 1;
                return Ok(Some(frame));
            }
            if !self.is_authenticated() {
                return Ok(None);
            }

            if let Some(transfer) = self.transfer.as_mut() {
                if let Some(chunk) = transfer.next_chunk().await? {
                    return Ok(Some(chunk));
                }
                if let Some(done) = self.transfer.take() {
                    self.stats.files_sent += 1;
                    tracing::info!(path = %done.path().display(), size = done.size(), "file sent");
                }
                if !self.queue.file_is_next() {
                    // Streaming is over; catch up on what arrived meanwhile.
                    self.process_frames()?;
                }
                continue;
            }

            match self.queue.pop() {
                Some(Outbound::Frame(frame)) => {
                    self.stats.frames_sent += 1;
                    return Ok(Some(frame));
                }
                Some(Outbound::File(path)) => {
                    if !self.start_queued_file(path).await {
                        self.process_frames()?;
                    }
                }
                None => return Ok(None),
            }
        }
    }

    /// Account for bytes the driver wrote.
    pub fn record_written(&mut self, len: usize) {
        self.stats.bytes_sent += len as u64;
    }

    /// Drop every piece of per-socket state after an error or disconnect.
    ///
    /// Queued publishes and waiting files are discarded, not retried.
    pub fn reset_connection_state(&mut self) {
        let discarded = self.queue.clear() + self.wire.len();
        if discarded > 0 || self.transfer.is_some() {
            tracing::warn!(
                discarded,
                streaming = self.transfer.is_some(),
                "discarding outbound data of closed connection"
            );
        }
        self.stats.dropped += discarded as u64;
        self.state = ConnectionState::Disconnected;
        self.transfer = None;
        self.wire.clear();
        self.unpacker.reset();
    }
}
