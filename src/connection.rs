//! A live WebSocket connection.
//!
//! [`Connection`] wraps the bidirectional byte stream after a successful
//! handshake. It exposes the write surface (text, binary, ping, pong,
//! close, raw frames, and a growing [`WriteBuffer`]) and drives the read
//! loop that pulls messages out of a [`Reader`] and dispatches them to the
//! user handler.
//!
//! Reads and writes are serialised by construction: the loop is
//! single-threaded per connection, so a server-emitted frame always
//! completes before the next inbound frame is read.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::buffer::{Buffer, BufferProvider};
use crate::close;
use crate::frame::{
    encode_header, MessageKind, OpCode, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, EMPTY_PONG,
    MAX_HEAD_SIZE,
};
use crate::reader::Reader;
use crate::server::Handler;
use crate::{Error, Result};

/// Initial capacity of a [`WriteBuffer`].
const WRITE_BUFFER_INITIAL: usize = 512;

/// A connection to a WebSocket client.
///
/// Owns the stream and a handle to the shared buffer provider. The policy
/// flags decide whether ping, pong, and close frames are surfaced to the
/// handler or answered internally.
pub struct Connection<S> {
    stream: S,
    provider: Arc<BufferProvider>,
    handle_ping: bool,
    handle_pong: bool,
    handle_close: bool,
    closed: bool,
}

impl<S: Read + Write> Connection<S> {
    /// Wraps a stream. All policy flags start off, meaning control frames
    /// are answered internally.
    pub fn new(stream: S, provider: Arc<BufferProvider>) -> Self {
        Self {
            stream,
            provider,
            handle_ping: false,
            handle_pong: false,
            handle_close: false,
            closed: false,
        }
    }

    /// Chooses which control frames are surfaced to the handler instead of
    /// being answered (ping), dropped (pong), or validated and replied to
    /// (close) internally.
    pub fn set_policies(&mut self, handle_ping: bool, handle_pong: bool, handle_close: bool) {
        self.handle_ping = handle_ping;
        self.handle_pong = handle_pong;
        self.handle_close = handle_close;
    }

    /// Asks the read loop to exit after the current dispatch returns.
    ///
    /// This only sets a flag; pair it with [`Connection::write_close`] to
    /// close the protocol conversation cleanly.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether [`Connection::close`] has been requested.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shared access to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutable access to the underlying stream, e.g. to install a read
    /// timeout.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Sends a text frame.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.write_frame(OpCode::Text, text.as_bytes())
    }

    /// Sends a binary frame.
    pub fn write_binary(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(OpCode::Binary, data)
    }

    /// Sends a ping carrying `data` (at most 125 bytes per RFC 6455).
    pub fn write_ping(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(OpCode::Ping, data)
    }

    /// Sends a pong carrying `data`.
    pub fn write_pong(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(OpCode::Pong, data)
    }

    /// Sends a close frame with code 1000 (normal closure).
    pub fn write_close(&mut self) -> Result<()> {
        self.write_framed(&CLOSE_NORMAL)
    }

    /// Sends a close frame carrying the given status code.
    pub fn write_close_with_code(&mut self, code: u16) -> Result<()> {
        let [hi, lo] = code.to_be_bytes();
        self.write_framed(&[0x88, 0x02, hi, lo])
    }

    /// Sends one complete server frame: FIN set, reserved bits clear, no
    /// mask, the payload as-is.
    pub fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        let mut head = [0u8; MAX_HEAD_SIZE];
        let size = encode_header(opcode, payload.len(), &mut head);
        self.stream.write_all(&head[..size])?;
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Writes already-framed bytes as-is. Escape hatch for callers that
    /// build frames themselves.
    pub fn write_framed(&mut self, frame: &[u8]) -> Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Returns a growing buffer that accumulates writes and emits them as
    /// one frame of `opcode` when flushed.
    pub fn write_buffer(&mut self, opcode: OpCode) -> Result<WriteBuffer<'_, S>> {
        let buffer = self.provider.alloc_pooled_or(WRITE_BUFFER_INITIAL)?;
        Ok(WriteBuffer {
            conn: self,
            opcode,
            buffer: Some(buffer),
            len: 0,
        })
    }

    /// Pulls messages from `reader` and dispatches them until the peer
    /// closes, an error ends the connection, or the handler requests
    /// shutdown via [`Connection::close`].
    ///
    /// Reader errors that RFC 6455 classifies as protocol violations with
    /// a mandated reply (`ReservedBitsNotZero`, `ControlFrameTooLarge`)
    /// are answered with close 1002 before the error is returned.
    pub fn read_loop<H: Handler<S>>(&mut self, reader: &mut Reader, handler: &mut H) -> Result<()> {
        loop {
            let message = match reader.read_message(&mut self.stream) {
                Ok(message) => message,
                Err(err) => {
                    if matches!(
                        err,
                        Error::ReservedBitsNotZero | Error::ControlFrameTooLarge
                    ) {
                        let _ = self.write_framed(&CLOSE_PROTOCOL_ERROR);
                    }
                    return Err(err);
                }
            };

            match message.kind {
                MessageKind::Text | MessageKind::Binary => handler.handle(self, message)?,
                MessageKind::Ping => {
                    if self.handle_ping {
                        handler.handle(self, message)?;
                    } else if message.payload.is_empty() {
                        self.write_framed(&EMPTY_PONG)?;
                    } else {
                        self.write_pong(message.payload)?;
                    }
                }
                MessageKind::Pong => {
                    if self.handle_pong {
                        handler.handle(self, message)?;
                    }
                }
                MessageKind::Close => {
                    if self.handle_close {
                        handler.handle(self, message)?;
                    } else {
                        let _ = self.reply_close(message.payload);
                    }
                    return Ok(());
                }
            }

            reader.handled();
            if self.closed {
                return Ok(());
            }
        }
    }

    /// Validates an inbound close payload and answers it: close 1000 when
    /// acceptable, close 1002 for a one-byte payload, a disallowed status
    /// code, or a reason that is not valid UTF-8.
    fn reply_close(&mut self, payload: &[u8]) -> Result<()> {
        match close::validate_close(payload) {
            Ok(()) => self.write_framed(&CLOSE_NORMAL),
            Err(_) => self.write_framed(&CLOSE_PROTOCOL_ERROR),
        }
    }
}

/// A growing write buffer that emits one frame on flush.
///
/// Starts at 512 bytes from the provider and grows by half plus a little
/// until the requested capacity fits, so repeated small writes do not
/// reallocate per call. Implements [`io::Write`], so `write!` and friends
/// work against it; the frame is only sent by [`WriteBuffer::flush`].
/// Dropping the buffer without flushing discards the bytes and returns the
/// buffer to the provider.
pub struct WriteBuffer<'c, S: Read + Write> {
    conn: &'c mut Connection<S>,
    opcode: OpCode,
    buffer: Option<Buffer>,
    len: usize,
}

impl<S: Read + Write> WriteBuffer<'_, S> {
    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sends the accumulated bytes as a single frame and releases the
    /// buffer.
    pub fn flush(mut self) -> Result<()> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(());
        };
        let result = self.conn.write_frame(self.opcode, &buffer[..self.len]);
        self.conn.provider.free(buffer);
        result
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.len + additional;
        let Some(buffer) = self.buffer.as_ref() else {
            return Err(Error::AllocationFailed);
        };
        if buffer.len() >= needed {
            return Ok(());
        }

        let mut capacity = buffer.len();
        while capacity < needed {
            capacity = capacity.saturating_add(capacity / 2 + 8);
        }
        let buffer = self.buffer.take().ok_or(Error::AllocationFailed)?;
        self.buffer = Some(self.conn.provider.grow(buffer, self.len, capacity)?);
        Ok(())
    }
}

impl<S: Read + Write> io::Write for WriteBuffer<'_, S> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.reserve(data.len())
            .map_err(|err| io::Error::new(io::ErrorKind::OutOfMemory, err))?;
        let buffer = self
            .buffer
            .as_mut()
            .expect("reserve leaves a buffer in place");
        buffer[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(data.len())
    }

    /// A no-op: bytes are only emitted by [`WriteBuffer::flush`], which
    /// consumes the buffer.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Read + Write> Drop for WriteBuffer<'_, S> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.conn.provider.free(buffer);
        }
    }
}
