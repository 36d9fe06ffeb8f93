//! Accepted connection streams and the handler seam.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use rustls::{ServerConnection, StreamOwned};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A connection accepted by one of the supervisor's listeners.
pub enum ConnectionStream {
    /// Plain TCP.
    Tcp(TcpStream),
    /// TCP wrapped in a server-side TLS session. The handshake completes on
    /// first read or write.
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
    /// Unix-domain stream.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Bounds blocking reads on the underlying socket.
    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            Self::Tls(stream) => stream.sock.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }

    /// Human-readable transport name for logs.
    #[must_use]
    pub const fn transport(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Tls(_) => "tls",
            #[cfg(unix)]
            Self::Unix(_) => "unix",
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            Self::Tls(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            Self::Tls(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Serves connections accepted by a listener.
///
/// The supervisor never inspects what a handler does; it only starts and
/// stops the listeners that feed it. Each call runs on its own thread and
/// owns the stream, so returning closes the connection.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

impl<F> RequestHandler for F
where
    F: Fn(ConnectionStream) + Send + Sync + 'static,
{
    fn handle(&self, stream: ConnectionStream) {
        self(stream);
    }
}
