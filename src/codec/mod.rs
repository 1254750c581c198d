//! Codec module - payload serialization for packets.
//!
//! Two payload encodings share the same packet framing:
//!
//! - [`JsonCodec`] - JSON via `serde_json` (default, what browser and Python
//!   consumers speak)
//! - [`MsgPackCodec`] - MessagePack via `rmp-serde`, struct-as-map
//!
//! The encoding of each packet is recorded in its header flags, so a reader
//! decodes whatever the writer chose.
//!
//! # Example
//!
//! ```
//! use glovelink::codec::Codec;
//!
//! let encoded = Codec::MsgPack.encode(&vec![1.0f32, 2.0]).unwrap();
//! let decoded: Vec<f32> = Codec::MsgPack.decode(&encoded).unwrap();
//! assert_eq!(decoded, vec![1.0, 2.0]);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::flags;

/// Payload encoding selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Json,
    #[serde(rename = "msgpack")]
    MsgPack,
}

impl Codec {
    /// Encode a value.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => JsonCodec::encode(value),
            Codec::MsgPack => MsgPackCodec::encode(value),
        }
    }

    /// Decode a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => JsonCodec::decode(bytes),
            Codec::MsgPack => MsgPackCodec::decode(bytes),
        }
    }

    /// Header flag bits announcing this encoding.
    #[inline]
    pub fn flags(self) -> u8 {
        match self {
            Codec::Json => 0,
            Codec::MsgPack => flags::MSGPACK,
        }
    }

    /// Encoding announced by a header's flags.
    #[inline]
    pub fn from_flags(bits: u8) -> Self {
        if flags::has_flag(bits, flags::MSGPACK) {
            Codec::MsgPack
        } else {
            Codec::Json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_roundtrip() {
        assert_eq!(Codec::from_flags(Codec::Json.flags()), Codec::Json);
        assert_eq!(Codec::from_flags(Codec::MsgPack.flags()), Codec::MsgPack);
    }

    #[test]
    fn test_config_names() {
        #[derive(Deserialize)]
        struct Holder {
            codec: Codec,
        }
        let h: Holder = toml::from_str("codec = \"msgpack\"").unwrap();
        assert_eq!(h.codec, Codec::MsgPack);
        let h: Holder = toml::from_str("codec = \"json\"").unwrap();
        assert_eq!(h.codec, Codec::Json);
    }

    #[test]
    fn test_json_payload_is_text() {
        let encoded = Codec::Json.encode(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(encoded, br#"{"a":1}"#);
    }
}
