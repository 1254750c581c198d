//! Packet buffer for accumulating partial reads.
//!
//! A state machine over a single `BytesMut`:
//! - `WaitingForHeader`: need at least 10 bytes
//! - `WaitingForPayload`: header validated, need N more payload bytes
//!
//! Every header is validated before its payload is awaited, so an oversize
//! length or reserved flag bit fails fast instead of buffering garbage.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::Packet;
use crate::error::Result;

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForPayload { header: Header },
}

/// Accumulates incoming bytes and extracts complete packets.
pub struct PacketBuffer {
    buffer: BytesMut,
    state: State,
    max_payload_size: u32,
}

impl PacketBuffer {
    /// Create a buffer with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a buffer with a custom payload limit.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete packets.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a header is invalid. The connection is
    /// unusable afterwards, since packet boundaries are lost.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.try_extract_one()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    fn try_extract_one(&mut self) -> Result<Option<Packet>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_payload_size)?;
                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.payload_length == 0 {
                        return Ok(Some(Packet::new(header, Bytes::new())));
                    }
                    self.state = State::WaitingForPayload { header };
                }
                State::WaitingForPayload { header } => {
                    let remaining = header.payload_length as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Packet::new(header, payload)));
                }
            }
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
