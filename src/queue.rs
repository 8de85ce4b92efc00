//! Outbound queue for deferred work.
//!
//! Publishes and file requests land here instead of on the socket while the
//! connection is not yet authenticated or while something else owns the
//! wire. Both kinds share one FIFO, so they leave in the order they were
//! submitted.
//!
//! The one exception is chaining: a file requested while another file is
//! streaming goes in with [`push_chained`](OutboundQueue::push_chained),
//! ahead of the publishes that transfer deferred. Chained files keep their
//! own submission order.
//!
//! # Configuration
//!
//! - `max_pending`: depth limit (default: 4096). A full queue rejects new
//!   entries instead of growing without bound during a long outage.

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::Bytes;

use crate::error::{FeedError, Result};

/// Default maximum number of deferred entries.
pub const DEFAULT_MAX_QUEUED: usize = 4096;

/// One deferred unit of outbound work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded PUBLISH frame.
    Frame(Bytes),
    /// A file to stream as one PUBLISH on the file channel.
    File(PathBuf),
}

/// FIFO of publishes and files awaiting transmission.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<Outbound>,
    /// Maximum allowed pending entries.
    max_pending: usize,
    /// Leading entries that are chained files.
    chained: usize,
}

impl OutboundQueue {
    /// Create a queue with the given depth limit.
    pub fn new(max_pending: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_pending,
            chained: 0,
        }
    }

    /// Append an entry at the tail.
    ///
    /// Returns `Err(QueueFull)` when the queue is at capacity.
    pub fn push(&mut self, item: Outbound) -> Result<()> {
        if self.is_full() {
            return Err(FeedError::QueueFull);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Insert a file behind the files already chained, ahead of everything
    /// else.
    pub fn push_chained(&mut self, path: PathBuf) -> Result<()> {
        if self.is_full() {
            return Err(FeedError::QueueFull);
        }
        self.items.insert(self.chained, Outbound::File(path));
        self.chained += 1;
        Ok(())
    }

    /// Take the oldest entry.
    pub fn pop(&mut self) -> Option<Outbound> {
        let item = self.items.pop_front()?;
        self.chained = self.chained.saturating_sub(1);
        Some(item)
    }

    /// Whether the next entry is a file.
    pub fn file_is_next(&self) -> bool {
        matches!(self.items.front(), Some(Outbound::File(_)))
    }

    /// Number of entries waiting.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check if the depth limit is reached.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_pending
    }

    /// Get maximum pending limit.
    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Discard everything waiting and return how many entries were lost.
    pub fn clear(&mut self) -> usize {
        let discarded = self.items.len();
        self.items.clear();
        self.chained = 0;
        discarded
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUED)
    }
}
