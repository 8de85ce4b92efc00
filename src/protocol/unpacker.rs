//! Incremental unpacker for accumulating partial reads.
//!
//! Bytes arrive from the socket in arbitrary slices. The unpacker buffers
//! them in a single `BytesMut` and hands out complete frames as soon as
//! their last byte is present.
//!
//! # Example
//!
//! ```
//! use hpfeeds_client::protocol::{encode_info, Opcode, Unpacker};
//!
//! let wire = encode_info(b"broker", b"nonce").unwrap();
//! let mut unpacker = Unpacker::new();
//!
//! unpacker.feed(&wire[..3]);
//! assert!(unpacker.next_frame().unwrap().is_none());
//!
//! unpacker.feed(&wire[3..]);
//! let frame = unpacker.next_frame().unwrap().unwrap();
//! assert_eq!(frame.opcode, Opcode::Info);
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// Initial buffer capacity; one file-transfer chunk plus slack.
const INITIAL_CAPACITY: usize = 16 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
#[derive(Debug)]
pub struct Unpacker {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
}

impl Unpacker {
    /// Create an empty unpacker.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append data without parsing anything.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the pending header breaks its opcode's size limit;
    ///   the connection must be dropped since framing is lost
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(header) = Header::decode(&self.buffer) else {
            return Ok(None);
        };
        header.validate()?;

        let total = header.length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let mut message = self.buffer.split_to(total);
        let payload = message.split_off(HEADER_SIZE).freeze();
        Ok(Some(Frame::new(header.opcode, payload)))
    }

    /// Validate the header at the front of the buffer without consuming it.
    ///
    /// Lets a caller that is not interpreting frames yet still reject an
    /// oversized message as soon as its header arrives.
    pub fn check_pending(&self) -> Result<()> {
        match Header::decode(&self.buffer) {
            Some(header) => header.validate(),
            None => Ok(()),
        }
    }

    /// Feed data and extract every frame that is now complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.feed(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop everything buffered, e.g. before a reconnect.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Unpacker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::protocol::{encode_auth, encode_error, encode_info, encode_publish, Opcode};

    #[test]
    fn test_single_complete_frame() {
        let mut unpacker = Unpacker::new();
        let frames = unpacker.push(&encode_error(b"hello").unwrap()).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Error);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(unpacker.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut combined = Vec::new();
        combined.extend_from_slice(&encode_info(b"broker", b"rand").unwrap());
        combined.extend_from_slice(&encode_publish(b"a", b"b", b"c").unwrap());
        combined.extend_from_slice(&encode_error(b"e").unwrap());

        let mut unpacker = Unpacker::new();
        let frames = unpacker.push(&combined).unwrap();

        let opcodes: Vec<_> = frames.iter().map(|f| f.opcode).collect();
        assert_eq!(opcodes, vec![Opcode::Info, Opcode::Publish, Opcode::Error]);
        assert!(unpacker.is_empty());
    }

    #[test]
    fn test_fragmented_header_and_payload() {
        let wire = encode_publish(b"sensor", b"channel", b"a longer payload to split").unwrap();
        let mut unpacker = Unpacker::new();

        unpacker.feed(&wire[..3]);
        assert!(unpacker.next_frame().unwrap().is_none());

        unpacker.feed(&wire[3..12]);
        assert!(unpacker.next_frame().unwrap().is_none());
        assert_eq!(unpacker.len(), 12);

        unpacker.feed(&wire[12..]);
        let frame = unpacker.next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Publish);
        assert!(unpacker.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = encode_auth(b"nonce", b"sensor", b"secret").unwrap();
        let mut unpacker = Unpacker::new();

        let mut all_frames = Vec::new();
        for byte in wire.iter() {
            all_frames.extend(unpacker.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].encode().unwrap(), wire);
    }

    #[test]
    fn test_empty_payload() {
        let mut unpacker = Unpacker::new();
        let frames = unpacker.push(&encode_error(b"").unwrap()).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_oversize_rejected_before_payload_arrives() {
        let mut unpacker = Unpacker::new();
        // INFO may not exceed 281 bytes.
        let header = Header::new(282, Opcode::Info).encode();

        let result = unpacker.push(&header);
        assert!(matches!(result, Err(FeedError::ProtocolViolation(_))));
        // Nothing partial is handed out on retry either.
        assert!(unpacker.next_frame().is_err());
    }

    #[test]
    fn test_check_pending_leaves_buffer_alone() {
        let wire = encode_error(b"later").unwrap();
        let mut unpacker = Unpacker::new();
        unpacker.feed(&wire);

        assert!(unpacker.check_pending().is_ok());
        assert_eq!(unpacker.len(), wire.len());

        let mut oversized = Unpacker::new();
        oversized.feed(&Header::new(600, Opcode::Subscribe).encode());
        assert!(oversized.check_pending().is_err());
    }

    #[test]
    fn test_large_publish_within_limit() {
        let data = vec![0xAB; 1024 * 1024 - 16];
        let wire = encode_publish(b"id", b"chan", &data).unwrap();
        let mut unpacker = Unpacker::new();

        let frames = unpacker.push(&wire).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.len(), wire.len() - HEADER_SIZE);
    }

    #[test]
    fn test_reset_restarts_cleanly() {
        let wire = encode_info(b"broker", b"rand").unwrap();
        let mut unpacker = Unpacker::new();

        unpacker.feed(&wire[..7]);
        unpacker.reset();
        assert!(unpacker.is_empty());

        let frames = unpacker.push(&wire).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Info);
    }

    #[test]
    fn test_reset_after_violation() {
        let mut unpacker = Unpacker::new();
        assert!(unpacker.push(&Header::new(2, Opcode::Error).encode()).is_err());

        unpacker.reset();
        let frames = unpacker.push(&encode_error(b"fine").unwrap()).unwrap();
        assert_eq!(frames.len(), 1);
    }
}
