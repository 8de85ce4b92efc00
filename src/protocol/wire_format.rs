//! Wire format encoding and decoding.
//!
//! Every message starts with a 5-byte header:
//! ```text
//! ┌──────────────┬────────┬─────────────────┐
//! │ Length       │ Opcode │ Payload         │
//! │ 4 bytes      │ 1 byte │ Length - 5      │
//! │ int32 BE     │        │                 │
//! └──────────────┴────────┴─────────────────┘
//! ```
//!
//! `Length` counts the whole message, header included. Strings inside a
//! payload carry a single length byte in front of them.

use bytes::{BufMut, Bytes};

use crate::error::{FeedError, Result};

/// Header size in bytes (length + opcode).
pub const HEADER_SIZE: usize = 5;

/// Largest payload accepted for bulk opcodes (1 MiB).
pub const MAX_BUFFER: u32 = 1024 * 1024;

/// Maximum length of a 1-byte-prefixed string.
pub const MAX_PREFIXED_LEN: usize = 255;

/// Size of the SHA-1 digest carried by AUTH.
pub const AUTH_DIGEST_SIZE: usize = 20;

/// Message opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Broker-side error report.
    Error,
    /// Broker greeting carrying its name and a nonce.
    Info,
    /// Client authentication reply.
    Auth,
    /// Data published to a channel.
    Publish,
    /// Channel subscription request.
    Subscribe,
    /// Any value this client does not know.
    Unknown(u8),
}

impl Opcode {
    /// Raw byte on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Info => 1,
            Self::Auth => 2,
            Self::Publish => 3,
            Self::Subscribe => 4,
            Self::Unknown(raw) => raw,
        }
    }

    /// Largest total message length (header included) accepted for this opcode.
    pub fn max_frame_len(self) -> u32 {
        let header = HEADER_SIZE as u32;
        match self {
            Self::Error | Self::Publish => header + MAX_BUFFER,
            Self::Info | Self::Auth => header + 256 + AUTH_DIGEST_SIZE as u32,
            Self::Subscribe => header + 256 * 2,
            Self::Unknown(_) => MAX_BUFFER,
        }
    }
}

impl From<u8> for Opcode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Error,
            1 => Self::Info,
            2 => Self::Auth,
            3 => Self::Publish,
            4 => Self::Subscribe,
            other => Self::Unknown(other),
        }
    }
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total message length in bytes, header included.
    pub length: i32,
    /// Message opcode.
    pub opcode: Opcode,
}

impl Header {
    /// Create a header from its raw fields.
    pub fn new(length: i32, opcode: Opcode) -> Self {
        Self { length, opcode }
    }

    /// Header for a message carrying `payload_len` bytes.
    ///
    /// Fails when the total does not fit the signed 32-bit length field.
    pub fn for_payload(opcode: Opcode, payload_len: u64) -> Result<Self> {
        let total = payload_len + HEADER_SIZE as u64;
        let length = i32::try_from(total).map_err(|_| {
            FeedError::violation(format!("message of {total} bytes overflows the length field"))
        })?;
        Ok(Self { length, opcode })
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use hpfeeds_client::protocol::{Header, Opcode};
    ///
    /// let bytes = Header::new(10, Opcode::Publish).encode();
    /// assert_eq!(bytes, [0, 0, 0, 10, 3]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4] = self.opcode.as_u8();
        buf
    }

    /// Decode header from bytes. Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            opcode: Opcode::from(buf[4]),
        })
    }

    /// Check the declared length against the opcode's limit.
    pub fn validate(&self) -> Result<()> {
        if self.length < HEADER_SIZE as i32 {
            return Err(FeedError::violation(format!(
                "declared length {} is shorter than the header",
                self.length
            )));
        }
        let max = self.opcode.max_frame_len();
        if self.length as u32 > max {
            return Err(FeedError::violation(format!(
                "not respecting max buffer: {:?} frame of {} bytes exceeds {}",
                self.opcode, self.length, max
            )));
        }
        Ok(())
    }

    /// Payload length implied by the header.
    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }
}

/// Append `value` with a 1-byte length prefix.
///
/// The prefix wraps modulo 256 rather than failing on long input; the
/// decoder is equally lenient about short input.
pub fn pack_prefixed<B: BufMut>(buf: &mut B, value: &[u8]) {
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}

/// Split a 1-byte-prefixed string off the front of `buf`.
///
/// Returns `(value, rest)`. A prefix longer than the remaining input yields
/// whatever bytes are available.
pub fn unpack_prefixed(buf: &Bytes) -> Result<(Bytes, Bytes)> {
    let Some(&len) = buf.first() else {
        return Err(FeedError::violation("missing length-prefixed string"));
    };
    let end = (1 + len as usize).min(buf.len());
    Ok((buf.slice(1..end), buf.slice(end..)))
}
