//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the hpfeeds binary protocol:
//! - 5-byte header encoding/decoding with per-opcode size limits
//! - Message encoders and a typed decoder
//! - Incremental unpacker for accumulating partial reads

mod frame;
mod unpacker;
mod wire_format;

pub use frame::{
    auth_digest, encode_auth, encode_error, encode_info, encode_publish, encode_subscribe,
    publish_header, Frame, Message,
};
pub use unpacker::Unpacker;
pub use wire_format::{
    pack_prefixed, unpack_prefixed, Header, Opcode, AUTH_DIGEST_SIZE, HEADER_SIZE, MAX_BUFFER,
    MAX_PREFIXED_LEN,
};
