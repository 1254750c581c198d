//! Wire format encoding and decoding.
//!
//! Implements the 10-byte packet header:
//! ```text
//! ┌──────┬───────┬──────────┬──────────┐
//! │ Kind │ Flags │ Sequence │ Length   │
//! │ u8   │ u8    │ u32 BE   │ u32 BE   │
//! └──────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{GloveError, Result};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Packet kinds.
pub mod kind {
    /// Collector → consumer: one batch of windows or frames.
    pub const BATCH: u8 = 1;
    /// Consumer → collector: answer to a batch.
    pub const REPLY: u8 = 2;
    /// Client → sync server.
    pub const SYNC_REQUEST: u8 = 3;
    /// Sync server → client.
    pub const SYNC_RESPONSE: u8 = 4;

    /// Check if `kind` is one of the known packet kinds.
    #[inline]
    pub fn is_known(kind: u8) -> bool {
        (BATCH..=SYNC_RESPONSE).contains(&kind)
    }
}

/// Flag constants.
pub mod flags {
    /// Payload is MessagePack (1) or JSON (0).
    pub const MSGPACK: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Packet kind (see `kind` module).
    pub kind: u8,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Batch sequence number; replies echo it.
    pub sequence: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: u8, flags: u8, sequence: u32, payload_length: u32) -> Self {
        Self {
            kind,
            flags,
            sequence,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use glovelink::protocol::{kind, Header};
    ///
    /// let header = Header::new(kind::BATCH, 0, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 10);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.sequence.to_be_bytes());
        buf[6..10].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use glovelink::protocol::Header;
    ///
    /// let bytes = [2, 0, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.kind, 2);
    /// assert_eq!(header.sequence, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            kind: buf[0],
            flags: buf[1],
            sequence: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            payload_length: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Kind is known
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if !kind::is_known(self.kind) {
            return Err(GloveError::Protocol(format!(
                "Unknown packet kind {}",
                self.kind
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(GloveError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(GloveError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if the payload is MessagePack.
    #[inline]
    pub fn is_msgpack(&self) -> bool {
        flags::has_flag(self.flags, flags::MSGPACK)
    }
}
