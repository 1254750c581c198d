//! JSON codec using `serde_json`.

use crate::error::Result;

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
