//! Codec module - serialization of publish bodies.
//!
//! - [`JsonCodec`] - JSON objects via `serde_json`, the format sensor
//!   channels are consumed in
//!
//! Codecs are marker structs with static methods rather than trait objects.

mod json;

pub use json::JsonCodec;
