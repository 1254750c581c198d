//! Protocol module - packet framing and typed payloads.
//!
//! - 10-byte header encoding/decoding
//! - Packet buffer for accumulating partial reads
//! - Typed delivery and sync messages

mod message;
mod packet;
mod packet_buffer;
mod wire_format;

pub use message::{
    Batch, BatchRef, DeliveryItem, DeliveryReply, ReplyOutcome, SeriesStats, SyncMode,
    SyncRequest, SyncResponse, SyncSeries,
};
pub use packet::Packet;
pub use packet_buffer::PacketBuffer;
pub use wire_format::{flags, kind, Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
