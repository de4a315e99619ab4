//! The transport a served connection runs over.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// A stream accepted by the server: TCP, or a Unix-domain socket on
/// platforms that have them.
#[non_exhaustive]
#[derive(Debug)]
pub enum NetStream {
    /// A TCP connection.
    Tcp(TcpStream),
    /// A Unix-domain connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl NetStream {
    /// Installs (or clears) a read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            NetStream::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            NetStream::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    /// Shuts down the connection. Closing the stream is also how a
    /// connection blocked in a read is cancelled from outside.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            NetStream::Tcp(s) => s.shutdown(how),
            #[cfg(unix)]
            NetStream::Unix(s) => s.shutdown(how),
        }
    }
}

impl From<TcpStream> for NetStream {
    fn from(value: TcpStream) -> Self {
        Self::Tcp(value)
    }
}

#[cfg(unix)]
impl From<UnixStream> for NetStream {
    fn from(value: UnixStream) -> Self {
        Self::Unix(value)
    }
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            NetStream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            NetStream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NetStream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            NetStream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NetStream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            NetStream::Unix(s) => s.flush(),
        }
    }
}
