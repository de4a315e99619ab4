//! A blocking WebSocket server library.
//!
//! `wharf` turns an accepted byte stream into a stream of well-formed
//! WebSocket messages and back, using one OS thread per connection and a
//! two-tier buffer strategy: every connection owns a small fixed read
//! buffer, and messages that outgrow it borrow a large buffer from a pool
//! shared across the whole server.
//!
//! The entry point is [`listen`], which accepts connections and drives a
//! user-supplied [`Handler`] for each one:
//!
//! ```no_run
//! use wharf::{listen, Config, Connection, Handler, Message, NetStream, Request};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     type Context = ();
//!
//!     fn init(_: &Request, _: &mut Connection<NetStream>, _: &()) -> wharf::Result<Self> {
//!         Ok(Echo)
//!     }
//!
//!     fn handle(&mut self, conn: &mut Connection<NetStream>, msg: Message) -> wharf::Result<()> {
//!         conn.write_binary(msg.payload)
//!     }
//! }
//!
//! fn main() -> wharf::Result<()> {
//!     listen::<Echo, ()>(Config::default(), ())
//! }
//! ```

pub mod close;
pub mod frame;

mod buffer;
mod connection;
mod handshake;
mod mask;
mod reader;
mod server;
mod stream;

pub use buffer::{Buffer, BufferProvider, Provenance};
pub use connection::{Connection, WriteBuffer};
pub use frame::{Message, MessageKind, OpCode};
pub use handshake::{HandshakeError, Request};
pub use reader::Reader;
pub use server::{listen, Config, Handler};
pub use stream::NetStream;

use thiserror::Error;

/// A result type for WebSocket operations, using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents errors that can occur while serving a WebSocket connection.
///
/// Variants fall into the categories the protocol itself distinguishes:
/// protocol violations by the peer (answered with a close frame where
/// RFC 6455 asks for one), resource-limit failures (which terminate the
/// connection silently), handshake failures (answered with a 400-class
/// HTTP reply), and plain I/O errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A new text or binary frame arrived while a fragmented message was
    /// still being assembled. Data messages cannot nest.
    #[error("invalid fragment")]
    InvalidFragment,

    /// A continuation frame arrived with no fragmented message in progress.
    #[error("invalid continuation frame")]
    InvalidContinuationFrame,

    /// A close frame carried a reason that is not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,

    /// A close frame had a one-byte payload. Close payloads are either
    /// empty or at least two bytes (the status code).
    #[error("invalid close frame")]
    InvalidCloseFrame,

    /// A close frame carried a status code outside the acceptable ranges.
    #[error("invalid close code")]
    InvalidCloseCode,

    /// One of the reserved header bits (rsv1/rsv2/rsv3) was set. No
    /// extensions are negotiated, so these must always be zero.
    #[error("reserved bits are not zero")]
    ReservedBitsNotZero,

    /// A control frame (close, ping, or pong) arrived without the FIN bit.
    /// Control frames must not be fragmented.
    #[error("control frame must not be fragmented")]
    ControlFrameFragmented,

    /// A control frame declared a payload longer than 125 bytes.
    #[error("control frame too large")]
    ControlFrameTooLarge,

    /// A client frame arrived unmasked. Client-to-server frames must
    /// always be masked.
    #[error("client frame is not masked")]
    FrameNotMasked,

    /// The frame header carried an opcode this library does not know.
    #[error("invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// A message (after reassembly) would exceed the configured maximum
    /// message size.
    #[error("message too large")]
    MessageTooLarge,

    /// The large-buffer pool was empty and the allocator refused the
    /// fallback allocation.
    #[error("buffer allocation failed")]
    AllocationFailed,

    /// The peer closed the stream mid-frame or before the next frame.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The opening handshake failed; see [`HandshakeError`] for the
    /// category, which decides the HTTP reply sent before closing.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// An I/O error on the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
