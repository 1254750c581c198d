//! Packet-oriented view of a byte stream.
//!
//! [`PacketConnection`] owns the stream and a [`PacketBuffer`]; callers send
//! and receive whole packets. `recv` is cancel-safe: the only await point is
//! a single `read`, and bytes are only consumed once it completes, so a
//! `recv` dropped inside `tokio::select!` loses nothing.

use std::collections::VecDeque;
use std::io::IoSlice;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::Codec;
use crate::error::{GloveError, Result};
use crate::protocol::{Packet, PacketBuffer, HEADER_SIZE};

const READ_CHUNK: usize = 16 * 1024;

/// Framed connection over any async stream.
pub struct PacketConnection<S> {
    stream: S,
    buffer: PacketBuffer,
    ready: VecDeque<Packet>,
    read_buf: Vec<u8>,
}

impl<S> PacketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: PacketBuffer::new(),
            ready: VecDeque::new(),
            read_buf: vec![0u8; READ_CHUNK],
        }
    }

    /// Write one packet and flush.
    ///
    /// Header and payload go out in one vectored write when the stream
    /// accepts it all; a partial write is finished with `write_all`.
    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        let header = packet.header.encode();
        let payload = packet.payload();
        let slices = [IoSlice::new(&header), IoSlice::new(payload)];

        let written = self.stream.write_vectored(&slices).await?;
        if written == 0 {
            return Err(GloveError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        if written < HEADER_SIZE {
            self.stream.write_all(&header[written..]).await?;
            self.stream.write_all(payload).await?;
        } else {
            self.stream.write_all(&payload[written - HEADER_SIZE..]).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Encode `value` and send it as one packet.
    pub async fn send_message<T: Serialize + ?Sized>(
        &mut self,
        kind: u8,
        sequence: u32,
        codec: Codec,
        value: &T,
    ) -> Result<()> {
        let packet = Packet::encode(kind, sequence, codec, value)?;
        self.send(&packet).await
    }

    /// Wait for the next complete packet.
    ///
    /// Returns `Err(ConnectionClosed)` on end of stream.
    pub async fn recv(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Ok(packet);
            }
            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(GloveError::ConnectionClosed);
            }
            self.ready.extend(self.buffer.push(&self.read_buf[..n])?);
        }
    }

    /// Receive a packet of the expected kind and decode its payload.
    ///
    /// Returns the packet sequence with the value.
    pub async fn recv_message<T: DeserializeOwned>(&mut self, kind: u8) -> Result<(u32, T)> {
        let packet = self.recv().await?;
        if packet.kind() != kind {
            return Err(GloveError::Protocol(format!(
                "expected packet kind {kind}, got {}",
                packet.kind()
            )));
        }
        Ok((packet.sequence(), packet.decode()?))
    }

    /// Shut down the write side.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
