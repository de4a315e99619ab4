//! The opening handshake.
//!
//! From [RFC 6455 Section 4.2](https://datatracker.ietf.org/doc/html/rfc6455#section-4.2):
//! the server must parse the client's HTTP/1.1 upgrade request, check the
//! required headers, and answer with a `101 Switching Protocols` response
//! whose `Sec-WebSocket-Accept` value is derived from the client's key.
//!
//! ```text
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```
//!
//! Request bytes accumulate in a fixed buffer leased from a bounded
//! [`HandshakePool`], which caps how many clients can be mid-handshake at
//! once. The pool blocks acquirers up to a timeout and the connection is
//! refused when it expires.

use std::io::Read;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// 258EAFA5-E914-47DA-95CA-C5AB0DC85B11
const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Length of a base64-encoded SHA-1 digest.
const ACCEPT_KEY_LEN: usize = 28;

const RESPONSE_PREFIX: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: ";

/// Exact size of the 101 response: fixed prefix, accept value, CRLFCRLF.
pub(crate) const ACCEPT_RESPONSE_LEN: usize = RESPONSE_PREFIX.len() + ACCEPT_KEY_LEN + 4;

/// Why an opening handshake was refused. The category picks the HTTP
/// reply written (best-effort) before the connection is closed.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The request was malformed or failed validation.
    #[error("invalid upgrade request")]
    Invalid,

    /// The request grew past the handshake buffer without terminating.
    #[error("upgrade request too large")]
    TooLarge,

    /// The client did not complete the request within the deadline.
    #[error("timed out reading upgrade request")]
    Timeout,

    /// The stream failed while reading the request.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    /// The HTTP reply for this failure category.
    pub(crate) fn response(&self) -> &'static [u8] {
        match self {
            HandshakeError::TooLarge => b"HTTP/1.1 400 Request Too Large\r\n\r\n",
            HandshakeError::Timeout => b"HTTP/1.1 408 Request Timeout\r\n\r\n",
            _ => b"HTTP/1.1 400 Invalid\r\n\r\n",
        }
    }
}

/// A validated upgrade request.
///
/// Borrows the handshake buffer, so it only lives until the handshake
/// state is released; handlers that need the path or a header later must
/// copy it out during `init`.
pub struct Request<'h, 'b> {
    path: &'b str,
    key: &'b [u8],
    headers: &'h [httparse::Header<'b>],
}

impl<'h, 'b> Request<'h, 'b> {
    /// Parses and validates an upgrade request from `buf`.
    ///
    /// `storage` bounds how many headers the request may carry. The
    /// request must be a case-sensitive `GET` over `HTTP/1.1` and carry
    /// `Upgrade: websocket`, a `Connection` list containing `Upgrade`
    /// (both values case-insensitive), `Sec-WebSocket-Version: 13`, and a
    /// `Sec-WebSocket-Key` that decodes to 16 bytes. Anything else is
    /// [`HandshakeError::Invalid`]. Request bodies are not expected;
    /// `Content-Length` and `Transfer-Encoding` are ignored.
    pub fn parse(
        buf: &'b [u8],
        storage: &'h mut [httparse::Header<'b>],
    ) -> Result<Request<'h, 'b>, HandshakeError> {
        let mut request = httparse::Request::new(storage);
        match request.parse(buf) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) | Err(_) => return Err(HandshakeError::Invalid),
        }

        if request.method != Some("GET") || request.version != Some(1) {
            return Err(HandshakeError::Invalid);
        }
        let Some(path) = request.path else {
            return Err(HandshakeError::Invalid);
        };

        let mut upgrade_ok = false;
        let mut connection_ok = false;
        let mut version_ok = false;
        let mut key: Option<&[u8]> = None;

        for header in request.headers.iter() {
            if header.name.eq_ignore_ascii_case("upgrade") {
                upgrade_ok = header.value.eq_ignore_ascii_case(b"websocket");
            } else if header.name.eq_ignore_ascii_case("connection") {
                connection_ok = header
                    .value
                    .split(|&b| b == b',')
                    .any(|token| token.trim_ascii().eq_ignore_ascii_case(b"upgrade"));
            } else if header.name.eq_ignore_ascii_case("sec-websocket-version") {
                version_ok = header.value == b"13";
            } else if header.name.eq_ignore_ascii_case("sec-websocket-key") {
                key = Some(header.value);
            }
        }

        let Some(key) = key else {
            return Err(HandshakeError::Invalid);
        };
        if !upgrade_ok || !connection_ok || !version_ok || !key_is_valid(key) {
            return Err(HandshakeError::Invalid);
        }

        Ok(Request {
            path,
            key,
            headers: request.headers,
        })
    }

    /// The request target, e.g. `/ws?room=1`.
    pub fn path(&self) -> &'b str {
        self.path
    }

    /// The raw `Sec-WebSocket-Key` value.
    pub fn key(&self) -> &'b [u8] {
        self.key
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&'b [u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value)
    }
}

/// A `Sec-WebSocket-Key` must be 16 bytes of base64.
fn key_is_valid(key: &[u8]) -> bool {
    let mut decoded = [0u8; 18];
    matches!(STANDARD.decode_slice(key, &mut decoded), Ok(16))
}

/// Derives the `Sec-WebSocket-Accept` value for a client key: the base64
/// encoding of SHA-1(key ‖ GUID).
pub fn accept_value(key: &[u8]) -> [u8; ACCEPT_KEY_LEN] {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(GUID);
    let digest = sha1.finalize();
    let mut output = [0u8; ACCEPT_KEY_LEN];
    STANDARD
        .encode_slice(digest, &mut output)
        .expect("accept key fits");
    output
}

/// Builds the complete 101 response for a client key.
pub(crate) fn accept_response(key: &[u8]) -> [u8; ACCEPT_RESPONSE_LEN] {
    let mut response = [0u8; ACCEPT_RESPONSE_LEN];
    response[..RESPONSE_PREFIX.len()].copy_from_slice(RESPONSE_PREFIX);
    response[RESPONSE_PREFIX.len()..RESPONSE_PREFIX.len() + ACCEPT_KEY_LEN]
        .copy_from_slice(&accept_value(key));
    response[ACCEPT_RESPONSE_LEN - 4..].copy_from_slice(b"\r\n\r\n");
    response
}

/// Accumulates upgrade-request bytes into `buf` until the terminating
/// `\r\n\r\n` sits at the end of what has been read.
///
/// Fails with [`HandshakeError::TooLarge`] when the buffer fills without a
/// terminator, [`HandshakeError::Invalid`] when the peer closes first, and
/// [`HandshakeError::Timeout`] when a read times out or `deadline` passes.
/// The caller is expected to have installed a socket read timeout so a
/// silent peer cannot block past the deadline.
pub fn read_request<'b, S: Read>(
    stream: &mut S,
    buf: &'b mut [u8],
    deadline: Option<Instant>,
) -> Result<&'b [u8], HandshakeError> {
    let mut len = 0;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(HandshakeError::Timeout);
        }
        if len == buf.len() {
            return Err(HandshakeError::TooLarge);
        }

        let n = match stream.read(&mut buf[len..]) {
            Ok(0) => return Err(HandshakeError::Invalid),
            Ok(n) => n,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(HandshakeError::Timeout)
            }
            Err(err) => return Err(err.into()),
        };
        len += n;

        if len >= 4 && &buf[len - 4..len] == b"\r\n\r\n" {
            return Ok(&buf[..len]);
        }
    }
}

/// Per-handshake scratch state: the fixed request buffer.
pub(crate) struct HandshakeState {
    buf: Box<[u8]>,
}

impl HandshakeState {
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// Bounded pool of [`HandshakeState`]s.
///
/// Deliberately has no heap fallback: its size caps how many connections
/// can be mid-handshake at once. Acquire blocks until a state frees up or
/// the timeout expires.
pub(crate) struct HandshakePool {
    states: Mutex<Vec<HandshakeState>>,
    available: Condvar,
}

impl HandshakePool {
    pub(crate) fn new(count: usize, buffer_size: usize) -> Self {
        let states = (0..count)
            .map(|_| HandshakeState {
                buf: vec![0u8; buffer_size].into_boxed_slice(),
            })
            .collect();
        Self {
            states: Mutex::new(states),
            available: Condvar::new(),
        }
    }

    /// Takes a state, waiting up to `timeout` for one to free up.
    pub(crate) fn acquire(&self, timeout: Duration) -> Option<HandshakeState> {
        let deadline = Instant::now() + timeout;
        let mut states = self.states.lock().unwrap();
        loop {
            if let Some(state) = states.pop() {
                return Some(state);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(states, deadline - now)
                .unwrap();
            states = guard;
        }
    }

    pub(crate) fn release(&self, state: HandshakeState) {
        self.states.lock().unwrap().push(state);
        self.available.notify_one();
    }
}
