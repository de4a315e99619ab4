//! The listening side: configuration, the handler contract, and the
//! per-connection orchestration.
//!
//! [`listen`] accepts connections and gives each one its own OS thread.
//! All I/O is blocking; the only state shared between connection threads
//! is the pair of bounded pools (handshake states and large buffers). A
//! connection is the unit of failure containment: whatever goes wrong on
//! one never affects another.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
#[cfg(unix)]
use std::os::unix::net::UnixListener;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::buffer::BufferProvider;
use crate::connection::Connection;
use crate::frame::Message;
use crate::handshake::{self, HandshakePool, Request};
use crate::reader::Reader;
use crate::stream::NetStream;
use crate::{Error, Result};

/// How long to wait for a handshake state when no handshake deadline is
/// configured. The pool is bounded on purpose; waiting forever would defeat
/// the cap.
const HANDSHAKE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// The application side of a connection.
///
/// One value of the implementing type exists per connection, created by
/// [`Handler::init`] after the handshake validates and dropped when the
/// connection ends. `init` may reject the connection by returning an
/// error, which is answered with a 400-class HTTP reply.
///
/// [`Handler::handle`] is called for every data message, and also for
/// ping/pong/close messages when the matching `handle_*` flag is set in
/// [`Config`]. Payloads borrow the reader's buffers, so anything needed
/// past the callback must be copied out.
pub trait Handler<S: Read + Write = NetStream>: Sized {
    /// Server-wide state cloned into every connection thread and passed to
    /// [`Handler::init`].
    type Context;

    /// Builds the handler for an accepted connection.
    fn init(request: &Request<'_, '_>, conn: &mut Connection<S>, context: &Self::Context)
        -> Result<Self>;

    /// Called for every dispatched message. Returning an error terminates
    /// the connection.
    fn handle(&mut self, conn: &mut Connection<S>, message: Message<'_>) -> Result<()>;

    /// Called once after the 101 reply, before the first read. Returning
    /// an error terminates the connection.
    fn after_init(&mut self, _conn: &mut Connection<S>) -> Result<()> {
        Ok(())
    }

    /// Called exactly once when the connection ends, however it ends.
    fn close(&mut self) {}
}

/// Server configuration.
///
/// All fields are public; the `with_*` helpers exist for fluent setup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind, default `127.0.0.1`.
    pub address: String,
    /// Port to bind, default 9223.
    pub port: u16,
    /// Serve over a Unix-domain socket instead of TCP. Mutually exclusive
    /// with `address`/`port`; `TCP_NODELAY` does not apply.
    #[cfg(unix)]
    pub unix_path: Option<PathBuf>,
    /// Size of the per-connection fixed read buffer, default 4096.
    pub buffer_size: usize,
    /// Largest accepted message after reassembly, default 65536.
    pub max_size: usize,
    /// Header-table capacity for the upgrade request, default 32.
    pub max_headers: usize,
    /// Largest accepted upgrade request, default 1024.
    pub handshake_max_size: usize,
    /// Number of pooled handshake states, default 50. Caps how many
    /// connections can be mid-handshake at once.
    pub handshake_pool_count: usize,
    /// Handshake deadline in milliseconds, default 10000. `None` disables
    /// the deadline and the per-read socket timeout.
    pub handshake_timeout_ms: Option<u64>,
    /// Number of pooled large buffers, default 32.
    pub large_buffer_pool_count: usize,
    /// Size of each pooled large buffer, default 32768.
    pub large_buffer_size: usize,
    /// Surface pings to the handler instead of answering with a pong.
    pub handle_ping: bool,
    /// Surface pongs to the handler instead of dropping them.
    pub handle_pong: bool,
    /// Surface close frames to the handler instead of validating and
    /// replying internally.
    pub handle_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 9223,
            #[cfg(unix)]
            unix_path: None,
            buffer_size: 4096,
            max_size: 65536,
            max_headers: 32,
            handshake_max_size: 1024,
            handshake_pool_count: 50,
            handshake_timeout_ms: Some(10_000),
            large_buffer_pool_count: 32,
            large_buffer_size: 32768,
            handle_ping: false,
            handle_pong: false,
            handle_close: false,
        }
    }
}

impl Config {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Serve over a Unix-domain socket at `path` instead of TCP.
    #[cfg(unix)]
    pub fn with_unix_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_path = Some(path.into());
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the handshake deadline; `None` disables it.
    pub fn with_handshake_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.handshake_timeout_ms = timeout_ms;
        self
    }

    pub fn with_handle_ping(mut self, yes: bool) -> Self {
        self.handle_ping = yes;
        self
    }

    pub fn with_handle_pong(mut self, yes: bool) -> Self {
        self.handle_pong = yes;
        self
    }

    pub fn with_handle_close(mut self, yes: bool) -> Self {
        self.handle_close = yes;
        self
    }
}

/// State shared by every connection thread.
struct Shared {
    provider: Arc<BufferProvider>,
    handshakes: HandshakePool,
    config: Config,
}

/// Binds the configured listener and serves connections forever, one
/// thread per accepted stream.
///
/// `context` is cloned into every connection thread and handed to
/// [`Handler::init`]. Only returns on a bind error; accept errors are
/// logged and the loop keeps going.
pub fn listen<H, C>(config: Config, context: C) -> Result<()>
where
    H: Handler<Context = C> + 'static,
    C: Clone + Send + 'static,
{
    let shared = Arc::new(Shared {
        provider: Arc::new(BufferProvider::new(
            config.large_buffer_pool_count,
            config.large_buffer_size,
        )),
        handshakes: HandshakePool::new(config.handshake_pool_count, config.handshake_max_size),
        config,
    });

    #[cfg(unix)]
    if let Some(path) = shared.config.unix_path.clone() {
        // a previous run may have left the socket file behind
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        log::debug!("listening on {}", path.display());
        for incoming in listener.incoming() {
            match incoming {
                Ok(stream) => {
                    spawn_connection::<H, C>(
                        Arc::clone(&shared),
                        context.clone(),
                        NetStream::Unix(stream),
                    );
                }
                Err(err) => log::error!("accepting connection: {err}"),
            }
        }
        return Ok(());
    }

    let listener = TcpListener::bind((shared.config.address.as_str(), shared.config.port))?;
    log::debug!(
        "listening on {}:{}",
        shared.config.address,
        shared.config.port
    );
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                if let Err(err) = stream.set_nodelay(true) {
                    log::debug!("setting TCP_NODELAY: {err}");
                }
                spawn_connection::<H, C>(
                    Arc::clone(&shared),
                    context.clone(),
                    NetStream::Tcp(stream),
                );
            }
            Err(err) => log::error!("accepting connection: {err}"),
        }
    }
    Ok(())
}

fn spawn_connection<H, C>(shared: Arc<Shared>, context: C, stream: NetStream)
where
    H: Handler<Context = C> + 'static,
    C: Send + 'static,
{
    let spawned = thread::Builder::new()
        .name("wharf-conn".to_string())
        .spawn(move || {
            if let Err(err) = serve::<H, C>(&shared, &context, stream) {
                log::debug!("connection ended: {err}");
            }
        });
    if let Err(err) = spawned {
        log::error!("spawning connection thread: {err}");
    }
}

/// Runs one connection to completion: handshake, handler setup, read loop,
/// teardown.
fn serve<H, C>(shared: &Shared, context: &C, mut stream: NetStream) -> Result<()>
where
    H: Handler<Context = C>,
{
    let config = &shared.config;
    let timeout = config.handshake_timeout_ms.map(Duration::from_millis);
    stream.set_read_timeout(timeout)?;

    let Some(mut state) = shared
        .handshakes
        .acquire(timeout.unwrap_or(HANDSHAKE_ACQUIRE_TIMEOUT))
    else {
        log::debug!("handshake pool exhausted, refusing connection");
        let _ = stream.write_all(b"HTTP/1.1 503 Service Unavailable\r\n\r\n");
        return Ok(());
    };

    // the request deadline covers reading, not the wait for a pooled state
    let deadline = timeout.map(|t| Instant::now() + t);
    let request_len = match handshake::read_request(&mut stream, state.buffer_mut(), deadline) {
        Ok(request) => request.len(),
        Err(err) => {
            let _ = stream.write_all(err.response());
            shared.handshakes.release(state);
            return Err(err.into());
        }
    };

    let mut conn = Connection::new(stream, Arc::clone(&shared.provider));
    conn.set_policies(config.handle_ping, config.handle_pong, config.handle_close);

    // the request borrows the pooled state, so handler setup happens in a
    // scope that ends before the state is released
    let setup = {
        let mut storage = vec![httparse::EMPTY_HEADER; config.max_headers];
        match Request::parse(&state.buffer()[..request_len], &mut storage) {
            Ok(request) => H::init(&request, &mut conn, context)
                .map(|handler| (handler, handshake::accept_response(request.key()))),
            Err(err) => Err(err.into()),
        }
    };
    shared.handshakes.release(state);

    let (mut handler, response) = match setup {
        Ok(ok) => ok,
        Err(err) => {
            let reply: &[u8] = match &err {
                Error::Handshake(failure) => failure.response(),
                _ => b"HTTP/1.1 400 Invalid\r\n\r\n",
            };
            let _ = conn.get_mut().write_all(reply);
            return Err(err);
        }
    };

    let run = (|| {
        conn.get_mut().write_all(&response)?;
        conn.get_ref().set_read_timeout(None)?;
        handler.after_init(&mut conn)?;
        let mut reader = Reader::new(
            config.buffer_size,
            config.max_size,
            Arc::clone(&shared.provider),
        );
        conn.read_loop(&mut reader, &mut handler)
    })();

    handler.close();
    let _ = conn.get_ref().shutdown(Shutdown::Both);
    run
}
