//! The per-connection frame reader / message assembler.
//!
//! [`Reader`] pulls RFC 6455 frames out of a blocking byte stream whose
//! packet boundaries are arbitrary and yields complete, unmasked
//! [`Message`]s. Frames are staged in a fixed buffer owned by the reader;
//! a message that cannot fit there is moved into a large buffer leased
//! from the shared [`BufferProvider`], as are fragmented messages while
//! they accumulate. Control frames always fit the fixed buffer and are
//! delivered immediately, even between fragments of a data message.
//!
//! After each delivered message the caller must invoke
//! [`Reader::handled`], which returns any leased buffer to the provider
//! and compacts leftover bytes of the next frame to the front of the
//! fixed buffer.

use std::io::Read;
use std::ops::Range;
use std::sync::Arc;

use crate::buffer::{Buffer, BufferProvider};
use crate::frame::{Message, MessageKind, OpCode};
use crate::mask;
use crate::{Error, Result};

/// Lower bound on the fixed buffer: a control frame (125-byte payload plus
/// a 14-byte header) must always fit.
const MIN_BUFFER_SIZE: usize = 256;

/// A decoded frame header. The length is already resolved from the 7-bit
/// indicator and any extended-length bytes.
struct FrameHeader {
    fin: bool,
    opcode: OpCode,
    mask: [u8; 4],
    payload_len: usize,
    header_len: usize,
}

/// Reads frames from a byte stream and assembles them into messages.
pub struct Reader {
    /// Fixed staging buffer; `buf[start..pos]` holds unconsumed bytes.
    buf: Box<[u8]>,
    start: usize,
    pos: usize,
    /// Cap on a single message after reassembly.
    max_size: usize,
    provider: Arc<BufferProvider>,
    /// Leased buffer holding an oversized or fragmented message.
    large: Option<Buffer>,
    large_len: usize,
    /// Set when the delivered message lives in `large`, so `handled`
    /// knows to release it.
    large_spent: bool,
    /// `Some` while a fragmented message is being assembled.
    fragmented: Option<MessageKind>,
}

impl Reader {
    /// Creates a reader with a fixed buffer of `buffer_size` bytes
    /// (raised to a small minimum so control frames always fit) that
    /// rejects messages larger than `max_size`.
    pub fn new(buffer_size: usize, max_size: usize, provider: Arc<BufferProvider>) -> Self {
        let buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        Self {
            buf: vec![0u8; buffer_size].into_boxed_slice(),
            start: 0,
            pos: 0,
            max_size,
            provider,
            large: None,
            large_len: 0,
            large_spent: false,
            fragmented: None,
        }
    }

    /// Returns the next logical message from `stream`.
    ///
    /// Blocks until a full message (or an interleaved control frame) has
    /// arrived. The returned payload borrows the reader; call
    /// [`Reader::handled`] once it has been dispatched.
    pub fn read_message<'a, S: Read>(&'a mut self, stream: &mut S) -> Result<Message<'a>> {
        loop {
            let FrameHeader {
                fin,
                opcode,
                mask,
                payload_len,
                header_len,
            } = self.read_header(stream)?;

            if opcode.is_control() {
                self.fill(stream, payload_len)?;
                let range = self.consume(payload_len);
                mask::apply_mask(&mut self.buf[range.clone()], mask);
                let kind = match opcode {
                    OpCode::Close => MessageKind::Close,
                    OpCode::Ping => MessageKind::Ping,
                    _ => MessageKind::Pong,
                };
                return Ok(Message {
                    kind,
                    payload: &self.buf[range],
                });
            }

            match opcode {
                OpCode::Continuation => {
                    let Some(kind) = self.fragmented else {
                        return Err(Error::InvalidContinuationFrame);
                    };
                    if self.large_len.saturating_add(payload_len) > self.max_size {
                        return Err(Error::MessageTooLarge);
                    }
                    self.append_fragment(stream, payload_len, mask)?;
                    if fin {
                        self.large_spent = true;
                        return Ok(Message {
                            kind,
                            payload: self.large_payload(),
                        });
                    }
                }
                OpCode::Text | OpCode::Binary => {
                    if self.fragmented.is_some() {
                        return Err(Error::InvalidFragment);
                    }
                    if payload_len > self.max_size {
                        return Err(Error::MessageTooLarge);
                    }
                    let kind = if opcode == OpCode::Text {
                        MessageKind::Text
                    } else {
                        MessageKind::Binary
                    };

                    if !fin {
                        self.fragmented = Some(kind);
                        self.stage_large(stream, payload_len, mask)?;
                    } else if header_len + payload_len <= self.buf.len() {
                        // whole frame fits the fixed buffer
                        self.fill(stream, payload_len)?;
                        let range = self.consume(payload_len);
                        mask::apply_mask(&mut self.buf[range.clone()], mask);
                        return Ok(Message {
                            kind,
                            payload: &self.buf[range],
                        });
                    } else {
                        self.stage_large(stream, payload_len, mask)?;
                        self.large_spent = true;
                        return Ok(Message {
                            kind,
                            payload: self.large_payload(),
                        });
                    }
                }
                // control opcodes were handled above
                OpCode::Close | OpCode::Ping | OpCode::Pong => unreachable!(),
            }
        }
    }

    /// Tells the reader the last message has been dispatched.
    ///
    /// Releases the large buffer if the message lived there, resets the
    /// fragmentation state, and moves any already-received bytes of the
    /// next frame to offset 0 so the next message starts at the front of
    /// the fixed buffer.
    pub fn handled(&mut self) {
        if self.large_spent {
            if let Some(buffer) = self.large.take() {
                self.provider.free(buffer);
            }
            self.large_len = 0;
            self.large_spent = false;
            self.fragmented = None;
        }
        if self.start == self.pos {
            self.start = 0;
            self.pos = 0;
        } else {
            self.compact();
        }
    }

    /// Decodes the next frame header, validating everything RFC 6455
    /// rejects unconditionally.
    fn read_header<S: Read>(&mut self, stream: &mut S) -> Result<FrameHeader> {
        self.fill(stream, 2)?;
        let b0 = self.buf[self.start];
        let b1 = self.buf[self.start + 1];

        if b0 & 0x70 != 0 {
            return Err(Error::ReservedBitsNotZero);
        }
        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::try_from(b0 & 0x0F)?;

        if b1 & 0x80 == 0 {
            return Err(Error::FrameNotMasked);
        }
        let length_code = b1 & 0x7F;

        if opcode.is_control() {
            if !fin {
                return Err(Error::ControlFrameFragmented);
            }
            if length_code > 125 {
                return Err(Error::ControlFrameTooLarge);
            }
        }

        let extra = match length_code {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_len = 2 + extra + 4;
        self.fill(stream, header_len)?;

        let payload_len = match length_code {
            126 => {
                u16::from_be_bytes([self.buf[self.start + 2], self.buf[self.start + 3]]) as usize
            }
            127 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&self.buf[self.start + 2..self.start + 10]);
                let len = u64::from_be_bytes(bytes);
                // the most significant bit must be zero
                if len & (1 << 63) != 0 || len > self.max_size as u64 {
                    return Err(Error::MessageTooLarge);
                }
                len as usize
            }
            short => short as usize,
        };

        let mut mask = [0u8; 4];
        mask.copy_from_slice(&self.buf[self.start + 2 + extra..self.start + header_len]);
        self.start += header_len;

        Ok(FrameHeader {
            fin,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }

    /// Ensures at least `n` unconsumed bytes sit contiguously in the fixed
    /// buffer, compacting first when the tail lacks room.
    fn fill<S: Read>(&mut self, stream: &mut S, n: usize) -> Result<()> {
        debug_assert!(n <= self.buf.len());
        if self.pos - self.start >= n {
            return Ok(());
        }
        if self.start + n > self.buf.len() {
            self.compact();
        }
        while self.pos - self.start < n {
            let read = stream.read(&mut self.buf[self.pos..])?;
            if read == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.pos += read;
        }
        Ok(())
    }

    fn compact(&mut self) {
        self.buf.copy_within(self.start..self.pos, 0);
        self.pos -= self.start;
        self.start = 0;
    }

    fn consume(&mut self, n: usize) -> Range<usize> {
        let range = self.start..self.start + n;
        self.start += n;
        range
    }

    /// Leases a large buffer for `payload_len` bytes and reads the frame's
    /// payload into it. Used both for a single frame too big for the fixed
    /// buffer and for the first fragment of a fragmented message.
    fn stage_large<S: Read>(
        &mut self,
        stream: &mut S,
        payload_len: usize,
        mask: [u8; 4],
    ) -> Result<()> {
        self.large = Some(self.provider.alloc_pooled_or(payload_len)?);
        self.large_len = 0;
        self.append_payload(stream, payload_len, mask)
    }

    /// Appends a continuation fragment, growing the accumulation buffer
    /// when needed.
    fn append_fragment<S: Read>(
        &mut self,
        stream: &mut S,
        payload_len: usize,
        mask: [u8; 4],
    ) -> Result<()> {
        let needed = self.large_len + payload_len;
        if let Some(buffer) = self.large.take() {
            self.large = Some(if buffer.len() < needed {
                self.provider.grow(buffer, self.large_len, needed)?
            } else {
                buffer
            });
        }
        self.append_payload(stream, payload_len, mask)
    }

    /// Moves `payload_len` bytes into the large buffer at `large_len`:
    /// whatever already sits in the fixed buffer first, the rest straight
    /// from the stream. Unmasks the appended region in place.
    fn append_payload<S: Read>(
        &mut self,
        stream: &mut S,
        payload_len: usize,
        mask: [u8; 4],
    ) -> Result<()> {
        let offset = self.large_len;
        let buffered = (self.pos - self.start).min(payload_len);
        let Some(buffer) = self.large.as_mut() else {
            return Err(Error::AllocationFailed);
        };

        buffer[offset..offset + buffered]
            .copy_from_slice(&self.buf[self.start..self.start + buffered]);
        self.start += buffered;

        stream.read_exact(&mut buffer[offset + buffered..offset + payload_len])?;
        mask::apply_mask(&mut buffer[offset..offset + payload_len], mask);
        self.large_len = offset + payload_len;
        Ok(())
    }

    fn large_payload(&self) -> &[u8] {
        match self.large {
            Some(ref buffer) => &buffer[..self.large_len],
            None => &[],
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if let Some(buffer) = self.large.take() {
            self.provider.free(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

    /// Builds a masked client frame.
    fn client_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 14);
        out.push(u8::from(fin) << 7 | opcode);
        let len = payload.len();
        if len < 126 {
            out.push(0x80 | len as u8);
        } else if len < 65536 {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(&MASK);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ MASK[i & 3]));
        out
    }

    /// Serves canned bytes in chunks of at most `chunk`, so tests can
    /// drive the reader across every possible packet boundary.
    struct Chunked {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Chunked {
        fn new(data: Vec<u8>, chunk: usize) -> Self {
            Self {
                data,
                pos: 0,
                chunk,
            }
        }
    }

    impl Read for Chunked {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(self.data.len() - self.pos).min(out.len());
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn reader(buffer_size: usize, max_size: usize) -> (Reader, Arc<BufferProvider>) {
        let provider = Arc::new(BufferProvider::new(2, 512));
        (
            Reader::new(buffer_size, max_size, Arc::clone(&provider)),
            provider,
        )
    }

    #[test]
    fn test_single_text_message() {
        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(client_frame(true, 0x1, b"over 9000!"), 64);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.payload, b"over 9000!");
        r.handled();
    }

    #[test]
    fn test_messages_across_all_packet_boundaries() {
        let mut script = Vec::new();
        script.extend(client_frame(true, 0x1, b"first message"));
        script.extend(client_frame(true, 0x2, &[0u8, 1, 2, 3, 255]));
        script.extend(client_frame(true, 0x9, b"ping!"));

        for chunk in 1..=script.len() {
            let (mut r, _) = reader(256, 65536);
            let mut stream = Chunked::new(script.clone(), chunk);

            let msg = r.read_message(&mut stream).unwrap();
            assert_eq!(msg.kind, MessageKind::Text);
            assert_eq!(msg.payload, b"first message", "chunk {}", chunk);
            r.handled();

            let msg = r.read_message(&mut stream).unwrap();
            assert_eq!(msg.kind, MessageKind::Binary);
            assert_eq!(msg.payload, &[0u8, 1, 2, 3, 255], "chunk {}", chunk);
            r.handled();

            let msg = r.read_message(&mut stream).unwrap();
            assert_eq!(msg.kind, MessageKind::Ping);
            assert_eq!(msg.payload, b"ping!", "chunk {}", chunk);
            r.handled();
        }
    }

    #[test]
    fn test_exact_fit_stays_in_fixed_buffer() {
        // 8-byte header + payload exactly fills the 256-byte buffer
        let payload = vec![0xABu8; 256 - 8];
        let (mut r, provider) = reader(256, 65536);
        let mut stream = Chunked::new(client_frame(true, 0x2, &payload), 64);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.payload, &payload[..]);
        // no pool buffer was leased
        assert_eq!(provider.available(), 2);
        r.handled();
    }

    #[test]
    fn test_one_past_fit_escalates_to_large_buffer() {
        let payload = vec![0xCDu8; 256 - 8 + 1];
        let (mut r, provider) = reader(256, 65536);
        let mut stream = Chunked::new(client_frame(true, 0x2, &payload), 64);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.payload, &payload[..]);
        assert_eq!(provider.available(), 1);

        r.handled();
        assert_eq!(provider.available(), 2);
    }

    #[test]
    fn test_back_to_back_messages_require_compaction() {
        // each fits alone, together they exceed the buffer
        let first = vec![b'a'; 160];
        let second = vec![b'b'; 160];
        let mut script = client_frame(true, 0x1, &first);
        script.extend(client_frame(true, 0x1, &second));

        let (mut r, provider) = reader(256, 65536);
        let mut stream = Chunked::new(script, 4096);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.payload, &first[..]);
        r.handled();

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.payload, &second[..]);
        r.handled();

        assert_eq!(provider.available(), 2);
    }

    #[test]
    fn test_fragmented_message_with_interleaved_pings() {
        let mut script = Vec::new();
        script.extend(client_frame(false, 0x1, b"one "));
        script.extend(client_frame(true, 0x9, b"p1"));
        script.extend(client_frame(false, 0x0, b"two "));
        script.extend(client_frame(true, 0x9, b"p2"));
        script.extend(client_frame(true, 0x0, b"three"));

        let (mut r, provider) = reader(256, 65536);
        let mut stream = Chunked::new(script, 3);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert_eq!(msg.payload, b"p1");
        r.handled();

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert_eq!(msg.payload, b"p2");
        r.handled();

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.payload, b"one two three");
        r.handled();

        assert_eq!(provider.available(), 2);
    }

    #[test]
    fn test_empty_fragmented_message() {
        let mut script = Vec::new();
        script.extend(client_frame(false, 0x1, b""));
        script.extend(client_frame(false, 0x0, b""));
        script.extend(client_frame(true, 0x0, b""));

        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(script, 64);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.payload, b"");
        r.handled();
    }

    #[test]
    fn test_fragmented_binary_keeps_type() {
        let mut script = Vec::new();
        script.extend(client_frame(false, 0x2, &[1, 2]));
        script.extend(client_frame(true, 0x0, &[3, 4]));

        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(script, 64);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Binary);
        assert_eq!(msg.payload, &[1, 2, 3, 4]);
        r.handled();
    }

    #[test]
    fn test_large_fragmented_message_grows_buffer() {
        let first = vec![b'x'; 700];
        let second = vec![b'y'; 700];
        let mut script = client_frame(false, 0x2, &first);
        script.extend(client_frame(true, 0x0, &second));

        let (mut r, provider) = reader(256, 65536);
        let mut stream = Chunked::new(script, 128);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.payload.len(), 1400);
        assert_eq!(&msg.payload[..700], &first[..]);
        assert_eq!(&msg.payload[700..], &second[..]);
        r.handled();

        assert_eq!(provider.available(), 2);
    }

    #[test]
    fn test_125_byte_ping() {
        let payload = vec![b'z'; 125];
        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(client_frame(true, 0x9, &payload), 16);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert_eq!(msg.payload, &payload[..]);
        r.handled();
    }

    #[test]
    fn test_control_with_extended_length_rejected() {
        // length indicator 126 on a ping
        let mut raw = vec![0x89, 0x80 | 126, 0x00, 0x7E];
        raw.extend_from_slice(&MASK);
        raw.extend(vec![0u8; 126]);

        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(raw, 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::ControlFrameTooLarge)
        ));
    }

    #[test]
    fn test_fragmented_control_rejected() {
        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(client_frame(false, 0x9, b"hm"), 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::ControlFrameFragmented)
        ));
    }

    #[test]
    fn test_reserved_bits_rejected() {
        for rsv in [0x40u8, 0x20, 0x10] {
            let mut raw = client_frame(true, 0x1, b"hi");
            raw[0] |= rsv;

            let (mut r, _) = reader(256, 65536);
            let mut stream = Chunked::new(raw, 64);
            assert!(matches!(
                r.read_message(&mut stream),
                Err(Error::ReservedBitsNotZero)
            ));
        }
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let raw = client_frame(true, 0x5, b"");
        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(raw, 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::InvalidOpCode(0x5))
        ));
    }

    #[test]
    fn test_unmasked_frame_rejected() {
        let mut raw = vec![0x81, 2]; // mask bit clear
        raw.extend_from_slice(b"hi");

        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(raw, 64);
        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::FrameNotMasked)
        ));
    }

    #[test]
    fn test_continuation_while_idle_rejected() {
        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(client_frame(true, 0x0, b"stray"), 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::InvalidContinuationFrame)
        ));
    }

    #[test]
    fn test_nested_fragmentation_rejected() {
        let mut script = client_frame(false, 0x1, b"first");
        script.extend(client_frame(false, 0x1, b"nested"));

        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(script, 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::InvalidFragment)
        ));
    }

    #[test]
    fn test_message_over_max_size_rejected() {
        let payload = vec![0u8; 600];
        let (mut r, _) = reader(256, 512);
        let mut stream = Chunked::new(client_frame(true, 0x2, &payload), 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::MessageTooLarge)
        ));
    }

    #[test]
    fn test_message_of_exactly_max_size_accepted() {
        let payload = vec![7u8; 512];
        let (mut r, _) = reader(256, 512);
        let mut stream = Chunked::new(client_frame(true, 0x2, &payload), 64);

        let msg = r.read_message(&mut stream).unwrap();
        assert_eq!(msg.payload.len(), 512);
        r.handled();
    }

    #[test]
    fn test_fragments_accumulating_past_max_size_rejected() {
        let mut script = client_frame(false, 0x2, &vec![0u8; 400]);
        script.extend(client_frame(true, 0x0, &vec![0u8; 400]));

        let (mut r, provider) = reader(256, 512);
        let mut stream = Chunked::new(script, 64);

        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::MessageTooLarge)
        ));
        // the accumulation buffer goes back when the reader is dropped
        drop(r);
        assert_eq!(provider.available(), 2);
    }

    #[test]
    fn test_peer_close_mid_frame() {
        let mut raw = client_frame(true, 0x1, b"truncated");
        raw.truncate(raw.len() - 3);

        let (mut r, _) = reader(256, 65536);
        let mut stream = Chunked::new(raw, 64);
        assert!(matches!(
            r.read_message(&mut stream),
            Err(Error::ConnectionClosed) | Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_random_boundary_sweep() {
        use rand::prelude::*;

        let mut script = Vec::new();
        script.extend(client_frame(false, 0x1, b"alpha "));
        script.extend(client_frame(true, 0x9, b"mid-ping"));
        script.extend(client_frame(false, 0x0, &vec![b'b'; 300]));
        script.extend(client_frame(true, 0x0, b" omega"));
        script.extend(client_frame(true, 0x2, &vec![0x5A; 400]));

        let mut rng = thread_rng();
        for _ in 0..32 {
            let chunk = rng.gen_range(1..=script.len());
            let (mut r, provider) = reader(256, 65536);
            let mut stream = Chunked::new(script.clone(), chunk);

            let msg = r.read_message(&mut stream).unwrap();
            assert_eq!(msg.kind, MessageKind::Ping);
            assert_eq!(msg.payload, b"mid-ping");
            r.handled();

            let msg = r.read_message(&mut stream).unwrap();
            assert_eq!(msg.kind, MessageKind::Text);
            assert_eq!(msg.payload.len(), 6 + 300 + 6);
            assert!(msg.payload.starts_with(b"alpha "));
            assert!(msg.payload.ends_with(b" omega"));
            r.handled();

            let msg = r.read_message(&mut stream).unwrap();
            assert_eq!(msg.kind, MessageKind::Binary);
            assert_eq!(msg.payload, &vec![0x5A; 400][..]);
            r.handled();

            assert_eq!(provider.available(), 2, "chunk {}", chunk);
        }
    }
}
