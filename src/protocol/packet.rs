//! Packet struct: one header plus its payload.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing. The payload encoding
//! travels in the header flags, so [`Packet::decode`] needs no outside hint.
//!
//! # Example
//!
//! ```
//! use glovelink::codec::Codec;
//! use glovelink::protocol::{kind, Packet};
//!
//! let packet = Packet::encode(kind::SYNC_REQUEST, 7, Codec::Json, &vec![1, 2]).unwrap();
//! assert_eq!(packet.sequence(), 7);
//! let values: Vec<u8> = packet.decode().unwrap();
//! assert_eq!(values, vec![1, 2]);
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::codec::Codec;
use crate::error::{GloveError, Result};

/// A complete protocol packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Serialize `value` with `codec` into a packet of the given kind.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn encode<T: Serialize + ?Sized>(
        kind: u8,
        sequence: u32,
        codec: Codec,
        value: &T,
    ) -> Result<Self> {
        let payload = codec.encode(value)?;
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|&n| n <= MAX_PAYLOAD_SIZE)
            .ok_or_else(|| {
                GloveError::Protocol(format!(
                    "Payload size {} exceeds maximum {}",
                    payload.len(),
                    MAX_PAYLOAD_SIZE
                ))
            })?;
        Ok(Self {
            header: Header::new(kind, codec.flags(), sequence, length),
            payload: Bytes::from(payload),
        })
    }

    /// Deserialize the payload with the codec named by the header flags.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.codec().decode(&self.payload)
    }

    /// Codec the payload was written with.
    #[inline]
    pub fn codec(&self) -> Codec {
        Codec::from_flags(self.header.flags)
    }

    #[inline]
    pub fn kind(&self) -> u8 {
        self.header.kind
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header and payload as one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}
