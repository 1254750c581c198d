//! MsgPack codec using `rmp-serde`.
//!
//! Always encode with `to_vec_named`, never `to_vec`: `to_vec` writes structs
//! as positional arrays, which consumers written against the JSON field names
//! (`sensor_values`, `session_id`, ...) cannot read. `to_vec_named` writes
//! structs as maps keyed by field name.
//!
//! # Example
//!
//! ```
//! use glovelink::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Sample {
//!     velocity: f64,
//! }
//!
//! let encoded = MsgPackCodec::encode(&Sample { velocity: 1.5 }).unwrap();
//! let decoded: Sample = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Sample { velocity: 1.5 });
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
