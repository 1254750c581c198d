//! Transport module - sockets and packet connections.
//!
//! Provides:
//! - [`Endpoint`] parsing for `tcp://` and `unix:` addresses
//! - [`Stream`] / [`Listener`] over TCP and Unix domain sockets
//! - [`PacketConnection`] sending and receiving whole packets

mod connection;
mod endpoint;
mod socket;

pub use connection::PacketConnection;
pub use endpoint::Endpoint;
pub use socket::{Listener, Stream};
