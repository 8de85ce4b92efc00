//! JSON codec for publish fields using `serde_json`.
//!
//! Brokers and downstream consumers of sensor channels expect each PUBLISH
//! body to be one JSON object whose keys are the event's field names.
//!
//! # Example
//!
//! ```
//! use hpfeeds_client::codec::JsonCodec;
//! use serde_json::json;
//!
//! let encoded = JsonCodec::encode_fields(&json!({"saddr": "10.0.0.1"})).unwrap();
//! assert_eq!(encoded, br#"{"saddr":"10.0.0.1"}"#);
//! assert!(JsonCodec::encode_fields(&42).is_err());
//! ```

use serde::ser::Error as _;

use crate::error::Result;

/// JSON codec for structured publish bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Encode publish fields, requiring them to form a JSON object.
    pub fn encode_fields<T: serde::Serialize + ?Sized>(fields: &T) -> Result<Vec<u8>> {
        let value = serde_json::to_value(fields)?;
        if !value.is_object() {
            return Err(
                serde_json::Error::custom("publish fields must serialize to a JSON object").into(),
            );
        }
        Ok(serde_json::to_vec(&value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct DceRequest {
        uuid: String,
        opnum: u16,
    }

    #[test]
    fn test_struct_encodes_as_object() {
        let req = DceRequest {
            uuid: "4b324fc8".to_string(),
            opnum: 9,
        };
        let encoded = JsonCodec::encode_fields(&req).unwrap();
        let value: serde_json::Value = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(value, serde_json::json!({"uuid": "4b324fc8", "opnum": 9}));

        let decoded: DceRequest = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_map_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("dport", "445");
        fields.insert("daddr", "192.0.2.1");

        let encoded = JsonCodec::encode_fields(&fields).unwrap();
        assert_eq!(encoded, br#"{"daddr":"192.0.2.1","dport":"445"}"#);
    }

    #[test]
    fn test_non_object_fields_rejected() {
        assert!(JsonCodec::encode_fields(&vec![1, 2, 3]).is_err());
        assert!(JsonCodec::encode_fields("text").is_err());
        assert!(JsonCodec::encode("text").is_ok());
    }
}
