//! websocket transport wrapper toolkit
//!
//! Wraps a byte transport and a byte oriented protocol with WebSocket
//! handshake and framing layers, negotiating HyBi-00/Hixie-76, HyBi-07,
//! HyBi-10 and RFC 6455 off the same initial bytes. The engine is
//! sans-IO: the host feeds it inbound bytes and supplies the outbound
//! transport capability; a tokio driver is included behind the `async`
//! feature.

#![warn(missing_docs)]

pub use http;

/// websocket error definitions
pub mod errors;
/// frame, opcode & dialect definitions
pub mod frame;
/// handshake computations & header parsing
pub mod handshake;
/// dialect framers & payload codecs
pub mod codec;
/// the per connection engine
pub mod connection;
/// tokio driver for the engine
#[cfg(feature = "async")]
pub mod stream;

pub use connection::{Handle, State, Transport, WebSocketConnection, WrappedProtocol};
pub use frame::{Dialect, Frame, Message, OpCode};

/// Connection level tunables.
///
/// `binary_mode` makes the HyBi-07+ encoder pick opcodes by message
/// kind; it defaults to off, so byte oriented protocols keep getting
/// text frames the way older clients expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConfig {
    /// send raw bytes as binary frames and text as text frames
    pub binary_mode: bool,
}
