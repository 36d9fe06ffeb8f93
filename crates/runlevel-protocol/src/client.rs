//! Control-socket client.
//!
//! [`ControlClient`] dials the socket for every call, sends one request,
//! reads one reply and closes. Retries are left to callers.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;

use crate::command::Command;
use crate::framing::{FramingError, read_line, write_message};
use crate::message::{Reply, Request};

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Upper bound on establishing a control connection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a supervisor's control socket.
#[derive(Debug, Clone)]
pub struct ControlClient {
    path: PathBuf,
}

impl ControlClient {
    /// Resolves `socket` to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ResolveSocket`] when the path is empty or
    /// cannot be made absolute.
    pub fn new(socket: impl AsRef<Utf8Path>) -> Result<Self, ClientError> {
        let socket = socket.as_ref();
        if socket.as_str().trim().is_empty() {
            return Err(ClientError::ResolveSocket {
                path: socket.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty socket path"),
            });
        }
        let path =
            std::path::absolute(socket.as_std_path()).map_err(|source| {
                ClientError::ResolveSocket {
                    path: socket.to_string(),
                    source,
                }
            })?;
        Ok(Self { path })
    }

    /// Absolute socket path this client dials.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sends `command` followed by `args` and returns the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the exchange fails or the server reports
    /// an error.
    pub fn send(&self, command: &str, args: &[&str]) -> Result<String, ClientError> {
        self.exchange(&Request::new(command, args))
    }

    /// Sends a typed command.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::send`].
    pub fn send_command(&self, command: &Command) -> Result<String, ClientError> {
        self.exchange(&Request {
            command: command.to_string(),
        })
    }

    fn exchange(&self, request: &Request) -> Result<String, ClientError> {
        let mut stream = self.connect()?;
        write_message(&mut stream, request).map_err(ClientError::Send)?;
        match read_line::<Reply, _>(&mut stream) {
            Ok(Some(Reply::Reply { text })) => Ok(text),
            Ok(Some(Reply::Error { message })) => Err(ClientError::Remote { message }),
            Ok(None) => Err(ClientError::UnexpectedEof),
            Err(FramingError::Io(error)) if is_disconnect(&error) => {
                Err(ClientError::UnexpectedEof)
            }
            Err(error) => Err(ClientError::Receive(error)),
        }
    }

    #[cfg(unix)]
    fn connect(&self) -> Result<UnixStream, ClientError> {
        let map_error = |source| ClientError::Connect {
            path: self.path.display().to_string(),
            source,
        };
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(map_error)?;
        let address = SockAddr::unix(&self.path).map_err(map_error)?;
        socket
            .connect_timeout(&address, CONNECTION_TIMEOUT)
            .map_err(map_error)?;
        Ok(socket.into())
    }

    #[cfg(not(unix))]
    fn connect(&self) -> Result<std::net::TcpStream, ClientError> {
        Err(ClientError::Unsupported {
            path: self.path.display().to_string(),
        })
    }
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
    )
}

/// Errors raised by [`ControlClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket path could not be resolved.
    #[error("failed to resolve control socket '{path}': {source}")]
    ResolveSocket {
        /// Configured path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Dialling the socket failed.
    #[error("failed to connect to control socket {path}: {source}")]
    Connect {
        /// Resolved path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are unavailable on this platform.
    #[cfg(not(unix))]
    #[error("control socket {path} requires Unix domain socket support")]
    Unsupported {
        /// Resolved path.
        path: String,
    },
    /// Writing the request failed.
    #[error("failed to send request: {0}")]
    Send(#[source] FramingError),
    /// Reading the reply failed.
    #[error("failed to read reply: {0}")]
    Receive(#[source] FramingError),
    /// The server closed the connection without replying.
    #[error("unexpected EOF")]
    UnexpectedEof,
    /// The server replied with an error.
    #[error("{message}")]
    Remote {
        /// Server-provided description.
        message: String,
    },
}

impl ClientError {
    /// IO error kind of a failed connection attempt.
    #[must_use]
    pub fn connect_error_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Connect { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Returns `true` when no process is listening on the socket.
    #[must_use]
    pub fn is_not_running(&self) -> bool {
        matches!(
            self.connect_error_kind(),
            Some(
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::AddrNotAvailable
            )
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::thread;

    use camino::Utf8PathBuf;

    use super::*;

    fn socket_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("ctl.sock")).expect("utf8 temp path")
    }

    fn serve_once(listener: UnixListener, reply: Option<Reply>) -> thread::JoinHandle<Request> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept client");
            let request: Request = read_line(&mut stream)
                .expect("read request")
                .expect("request present");
            if let Some(reply) = reply {
                write_message(&mut stream, &reply).expect("write reply");
            }
            request
        })
    }

    #[test]
    fn send_returns_reply_text() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = socket_path(&dir);
        let listener = UnixListener::bind(&path).expect("bind socket");
        let server = serve_once(listener, Some(Reply::text("OKAY")));

        let client = ControlClient::new(&path).expect("client");
        assert_eq!(client.send("KICK", &[]).expect("send"), "OKAY");
        assert_eq!(server.join().expect("join").command, "KICK");
    }

    #[test]
    fn remote_errors_surface_as_client_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = socket_path(&dir);
        let listener = UnixListener::bind(&path).expect("bind socket");
        let server = serve_once(listener, Some(Reply::error("hook failed")));

        let client = ControlClient::new(&path).expect("client");
        let error = client.send("telinit", &["3"]).expect_err("remote error");
        assert!(matches!(error, ClientError::Remote { ref message } if message == "hook failed"));
        server.join().expect("join");
    }

    #[test]
    fn closed_connection_reports_unexpected_eof() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = socket_path(&dir);
        let listener = UnixListener::bind(&path).expect("bind socket");
        let server = serve_once(listener, None);

        let client = ControlClient::new(&path).expect("client");
        let error = client.send_command(&Command::Kick).expect_err("no reply");
        assert!(matches!(error, ClientError::UnexpectedEof));
        server.join().expect("join");
    }

    #[test]
    fn missing_socket_is_not_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let client = ControlClient::new(socket_path(&dir)).expect("client");
        let error = client.send("status", &[]).expect_err("nothing listening");
        assert!(error.is_not_running(), "unexpected error: {error}");
        assert_eq!(error.connect_error_kind(), Some(io::ErrorKind::NotFound));
    }

    #[test]
    fn empty_path_fails_resolution() {
        let error = ControlClient::new("").expect_err("empty path");
        assert!(matches!(error, ClientError::ResolveSocket { .. }));
    }
}
