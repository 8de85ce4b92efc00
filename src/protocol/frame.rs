//! Frames and typed messages.
//!
//! A [`Frame`] is the raw `(opcode, payload)` pair that travels on the wire.
//! [`Message`] is its decoded form. The `encode_*` functions build complete,
//! ready-to-send messages.
//!
//! # Example
//!
//! ```
//! use hpfeeds_client::protocol::{encode_publish, Frame, Message};
//!
//! let wire = encode_publish(b"sensor-1", b"dionaea.capture", b"{}").unwrap();
//! let frame = Frame::decode(&wire).unwrap();
//! match Message::decode(&frame).unwrap() {
//!     Message::Publish { channel, .. } => assert_eq!(&channel[..], b"dionaea.capture"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};

use super::wire_format::{
    pack_prefixed, unpack_prefixed, Header, Opcode, AUTH_DIGEST_SIZE, HEADER_SIZE,
};
use crate::error::{FeedError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message opcode.
    pub opcode: Opcode,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from opcode and payload.
    pub fn new(opcode: Opcode, payload: Bytes) -> Self {
        Self { opcode, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encode header and payload into one contiguous buffer.
    ///
    /// The length field is computed from the payload; payloads that cannot
    /// be described by a signed 32-bit length are a caller bug and are
    /// reported as a protocol violation.
    pub fn encode(&self) -> Result<Bytes> {
        let header = Header::for_payload(self.opcode, self.payload.len() as u64)?;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode exactly one complete message from `buf`.
    ///
    /// Enforces the opcode's size limit. A buffer shorter than the declared
    /// length is a violation here; use [`Unpacker`](super::Unpacker) for
    /// partial input.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header =
            Header::decode(buf).ok_or_else(|| FeedError::violation("truncated header"))?;
        header.validate()?;
        let end = header.length as usize;
        if buf.len() < end {
            return Err(FeedError::violation(format!(
                "frame declares {end} bytes but only {} are present",
                buf.len()
            )));
        }
        Ok(Self::new(
            header.opcode,
            Bytes::copy_from_slice(&buf[HEADER_SIZE..end]),
        ))
    }
}

/// Assemble a complete message, refusing one over the opcode's size limit.
fn build(opcode: Opcode, payload: &[u8]) -> Result<Bytes> {
    let len = HEADER_SIZE + payload.len();
    let max = opcode.max_frame_len();
    if len > max as usize {
        return Err(FeedError::Oversized { opcode, len, max });
    }
    let header = Header::for_payload(opcode, payload.len() as u64)?;
    let mut buf = BytesMut::with_capacity(len);
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// PUBLISH: prefixed identity, prefixed channel, raw data.
pub fn encode_publish(ident: &[u8], channel: &[u8], data: &[u8]) -> Result<Bytes> {
    let mut payload = BytesMut::with_capacity(2 + ident.len() + channel.len() + data.len());
    pack_prefixed(&mut payload, ident);
    pack_prefixed(&mut payload, channel);
    payload.extend_from_slice(data);
    build(Opcode::Publish, &payload)
}

/// SUBSCRIBE: prefixed identity followed by the raw channel name.
pub fn encode_subscribe(ident: &[u8], channel: &[u8]) -> Result<Bytes> {
    let mut payload = BytesMut::with_capacity(1 + ident.len() + channel.len());
    pack_prefixed(&mut payload, ident);
    payload.extend_from_slice(channel);
    build(Opcode::Subscribe, &payload)
}

/// AUTH: prefixed identity followed by `SHA1(nonce ++ secret)`.
pub fn encode_auth(nonce: &[u8], ident: &[u8], secret: &[u8]) -> Result<Bytes> {
    let mut payload = BytesMut::with_capacity(1 + ident.len() + AUTH_DIGEST_SIZE);
    pack_prefixed(&mut payload, ident);
    payload.extend_from_slice(&auth_digest(nonce, secret));
    build(Opcode::Auth, &payload)
}

/// INFO: prefixed broker name followed by the nonce.
pub fn encode_info(name: &[u8], nonce: &[u8]) -> Result<Bytes> {
    let mut payload = BytesMut::with_capacity(1 + name.len() + nonce.len());
    pack_prefixed(&mut payload, name);
    payload.extend_from_slice(nonce);
    build(Opcode::Info, &payload)
}

/// ERROR: free-form message.
pub fn encode_error(message: &[u8]) -> Result<Bytes> {
    build(Opcode::Error, message)
}

/// Digest a client proves knowledge of its secret with.
pub fn auth_digest(nonce: &[u8], secret: &[u8]) -> [u8; AUTH_DIGEST_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(secret);
    let mut digest = [0u8; AUTH_DIGEST_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Header and prefixes of a PUBLISH whose `data_len` data bytes follow separately.
///
/// The returned bytes announce the full message length, so exactly
/// `data_len` bytes must be written after them.
pub fn publish_header(ident: &[u8], channel: &[u8], data_len: u64) -> Result<Bytes> {
    let mut prefix = BytesMut::with_capacity(2 + ident.len() + channel.len());
    pack_prefixed(&mut prefix, ident);
    pack_prefixed(&mut prefix, channel);
    let header = Header::for_payload(Opcode::Publish, prefix.len() as u64 + data_len)?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + prefix.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&prefix);
    Ok(buf.freeze())
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Broker error report.
    Error(Bytes),
    /// Broker greeting.
    Info {
        /// Broker name.
        name: Bytes,
        /// Nonce to authenticate against.
        nonce: Bytes,
    },
    /// Authentication reply.
    Auth {
        /// Client identity.
        ident: Bytes,
        /// `SHA1(nonce ++ secret)`.
        digest: Bytes,
    },
    /// Data published to a channel.
    Publish {
        /// Publisher identity.
        ident: Bytes,
        /// Target channel.
        channel: Bytes,
        /// Raw data.
        data: Bytes,
    },
    /// Subscription request.
    Subscribe {
        /// Subscriber identity.
        ident: Bytes,
        /// Channel name.
        channel: Bytes,
    },
    /// Opcode this client does not interpret.
    Unknown {
        /// Raw opcode.
        opcode: u8,
        /// Untouched payload.
        payload: Bytes,
    },
}

impl Message {
    /// Interpret a frame's payload according to its opcode.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let payload = &frame.payload;
        Ok(match frame.opcode {
            Opcode::Error => Self::Error(payload.clone()),
            Opcode::Info => {
                let (name, nonce) = unpack_prefixed(payload)?;
                Self::Info { name, nonce }
            }
            Opcode::Auth => {
                let (ident, digest) = unpack_prefixed(payload)?;
                Self::Auth { ident, digest }
            }
            Opcode::Publish => {
                let (ident, rest) = unpack_prefixed(payload)?;
                let (channel, data) = unpack_prefixed(&rest)?;
                Self::Publish {
                    ident,
                    channel,
                    data,
                }
            }
            Opcode::Subscribe => {
                let (ident, channel) = unpack_prefixed(payload)?;
                Self::Subscribe { ident, channel }
            }
            Opcode::Unknown(opcode) => Self::Unknown {
                opcode,
                payload: payload.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(wire: &[u8]) -> Message {
        Message::decode(&Frame::decode(wire).unwrap()).unwrap()
    }

    #[test]
    fn test_publish_layout() {
        let wire = encode_publish(b"id", b"ch", b"data").unwrap();
        assert_eq!(&wire[..], b"\x00\x00\x00\x0f\x03\x02id\x02chdata");
    }

    #[test]
    fn test_publish_roundtrip() {
        let wire = encode_publish(b"sensor", b"dionaea.capture", b"{\"a\":1}").unwrap();
        let msg = roundtrip(&wire);
        assert_eq!(
            msg,
            Message::Publish {
                ident: Bytes::from_static(b"sensor"),
                channel: Bytes::from_static(b"dionaea.capture"),
                data: Bytes::from_static(b"{\"a\":1}"),
            }
        );
    }

    #[test]
    fn test_subscribe_roundtrip() {
        let msg = roundtrip(&encode_subscribe(b"sensor", b"mwbinary").unwrap());
        assert_eq!(
            msg,
            Message::Subscribe {
                ident: Bytes::from_static(b"sensor"),
                channel: Bytes::from_static(b"mwbinary"),
            }
        );
    }

    #[test]
    fn test_auth_digest_is_sha1_of_nonce_and_secret() {
        // sha1("abc")
        let expected = hex::decode("a9993e364706816aba3e25717850c26c9cd0d89d").unwrap();
        assert_eq!(auth_digest(b"ab", b"c").to_vec(), expected);

        let msg = roundtrip(&encode_auth(b"ab", b"sensor", b"c").unwrap());
        assert_eq!(
            msg,
            Message::Auth {
                ident: Bytes::from_static(b"sensor"),
                digest: Bytes::from(expected),
            }
        );
    }

    #[test]
    fn test_auth_fits_limit_with_max_ident() {
        let wire = encode_auth(b"nonce", &[b'i'; 255], b"secret").unwrap();
        assert_eq!(wire.len() as u32, Opcode::Auth.max_frame_len());
        assert!(Frame::decode(&wire).is_ok());
    }

    #[test]
    fn test_publish_over_limit_is_refused() {
        let max = Opcode::Publish.max_frame_len() as usize;
        // 5 header bytes plus "\x02id\x02ch"
        let fits = vec![0u8; max - 11];
        assert_eq!(encode_publish(b"id", b"ch", &fits).unwrap().len(), max);

        let over = vec![0u8; max - 10];
        match encode_publish(b"id", b"ch", &over) {
            Err(FeedError::Oversized { opcode, len, max: limit }) => {
                assert_eq!(opcode, Opcode::Publish);
                assert_eq!(len, max + 1);
                assert_eq!(limit as usize, max);
            }
            other => panic!("expected Oversized, got {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_over_limit_is_refused() {
        let channel = vec![b'c'; 600];
        assert!(matches!(
            encode_subscribe(b"sensor", &channel),
            Err(FeedError::Oversized { opcode: Opcode::Subscribe, .. })
        ));
    }

    #[test]
    fn test_info_and_error_roundtrip() {
        let msg = roundtrip(&encode_info(b"broker", b"\x01\x02\x03\x04").unwrap());
        assert_eq!(
            msg,
            Message::Info {
                name: Bytes::from_static(b"broker"),
                nonce: Bytes::from_static(b"\x01\x02\x03\x04"),
            }
        );
        assert_eq!(
            roundtrip(&encode_error(b"bad auth").unwrap()),
            Message::Error(Bytes::from_static(b"bad auth"))
        );
    }

    #[test]
    fn test_frame_encode_matches_encoders() {
        let frame = Frame::new(Opcode::Error, Bytes::from_static(b"oops"));
        assert_eq!(frame.encode().unwrap(), encode_error(b"oops").unwrap());
    }

    #[test]
    fn test_unknown_opcode_passthrough() {
        let frame = Frame::new(Opcode::Unknown(42), Bytes::from_static(b"xyz"));
        let msg = roundtrip(&frame.encode().unwrap());
        assert_eq!(
            msg,
            Message::Unknown {
                opcode: 42,
                payload: Bytes::from_static(b"xyz"),
            }
        );
    }

    #[test]
    fn test_publish_header_announces_full_length() {
        let header = publish_header(b"id", b"ch", 100).unwrap();
        assert_eq!(header.len(), 5 + 3 + 3);
        let decoded = Header::decode(&header).unwrap();
        assert_eq!(decoded.opcode, Opcode::Publish);
        assert_eq!(decoded.length, 5 + 3 + 3 + 100);
    }

    #[test]
    fn test_publish_header_matches_inline_publish() {
        let data = b"binary\x00payload";
        let mut streamed = publish_header(b"id", b"ch", data.len() as u64)
            .unwrap()
            .to_vec();
        streamed.extend_from_slice(data);
        assert_eq!(streamed, encode_publish(b"id", b"ch", data).unwrap().to_vec());
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        let wire = encode_publish(b"id", b"ch", b"data").unwrap();
        assert!(Frame::decode(&wire[..wire.len() - 1]).is_err());
    }

    #[test]
    fn test_publish_missing_channel_is_violation() {
        let frame = Frame::new(Opcode::Publish, Bytes::from_static(b"\x02id"));
        assert!(matches!(
            Message::decode(&frame),
            Err(FeedError::ProtocolViolation(_))
        ));
    }
}
