//! Chunked file streaming.
//!
//! A transfer announces the whole file in a single PUBLISH header and then
//! emits the file body in bounded chunks, so a large capture never sits in
//! memory at once. The header commits to a length; once it is on the wire
//! the transfer must either finish or the connection must be dropped.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{FeedError, Result};
use crate::protocol::publish_header;

/// An open file being streamed as the data section of one PUBLISH.
#[derive(Debug)]
pub(crate) struct FileTransfer {
    path: PathBuf,
    file: File,
    /// Bytes announced in the header but not yet read.
    remaining: u64,
    /// Size announced in the header.
    size: u64,
    chunk_size: usize,
}

impl FileTransfer {
    /// Open `path` and build the header that announces it.
    pub(crate) async fn open(
        path: PathBuf,
        ident: &[u8],
        channel: &[u8],
        chunk_size: usize,
    ) -> Result<(Self, Bytes)> {
        let file = File::open(&path).await.map_err(|source| FeedError::File {
            path: path.clone(),
            source,
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| FeedError::File {
                path: path.clone(),
                source,
            })?
            .len();
        let header = publish_header(ident, channel, size)?;

        let transfer = Self {
            path,
            file,
            remaining: size,
            size,
            chunk_size,
        };
        Ok((transfer, header))
    }

    /// Read the next chunk of the announced body.
    ///
    /// Returns `Ok(None)` once every announced byte has been produced. A file
    /// that ends early is an error: the frame on the wire can no longer be
    /// completed.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut buf = BytesMut::zeroed(want);
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Err(FeedError::TruncatedFile {
                path: self.path.clone(),
                missing: self.remaining,
            });
        }

        buf.truncate(n);
        self.remaining -= n as u64;
        Ok(Some(buf.freeze()))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Size announced in the header.
    pub(crate) fn size(&self) -> u64 {
        self.size
    }
}
