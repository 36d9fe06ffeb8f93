//! Minimal HTTP handlers served on public listeners when the application
//! supplies none of its own.

use std::io::{self, Read, Write};
use std::sync::Weak;

use tracing::debug;

use crate::engine::Engine;
use crate::transport::{ConnectionStream, RequestHandler};

const HANDLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::http");

/// Upper bound on a request head.
const MAX_HEAD_BYTES: usize = 16 * 1024;
const HTTPS_PORT: &str = "443";

/// The parts of a request head the built-in handlers look at.
#[derive(Debug, Default, PartialEq, Eq)]
struct RequestHead {
    path: String,
    host: Option<String>,
}

impl RequestHead {
    fn parse(raw: &str) -> Self {
        let mut lines = raw.split("\r\n");
        let path = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/")
            .to_owned();
        let host = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("host"))
            .map(|(_, value)| value.trim().to_owned());
        Self { path, host }
    }
}

/// Reads up to the blank line ending the request head.
fn read_head(stream: &mut ConnectionStream) -> io::Result<RequestHead> {
    let mut buffer = Vec::with_capacity(512);
    let mut chunk = [0_u8; 512];
    while !buffer.windows(4).any(|window| window == b"\r\n\r\n") {
        if buffer.len() >= MAX_HEAD_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
        let read = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        buffer.extend_from_slice(&chunk[..read]);
    }
    Ok(RequestHead::parse(&String::from_utf8_lossy(&buffer)))
}

fn log_failure(stream: &ConnectionStream, error: &io::Error) {
    debug!(
        target: HANDLER_TARGET,
        transport = stream.transport(),
        error = %error,
        "http exchange failed"
    );
}

/// Answers every request with the plain-text status report.
pub(crate) struct StatusPage {
    engine: Weak<Engine>,
}

impl StatusPage {
    pub(crate) const fn new(engine: Weak<Engine>) -> Self {
        Self { engine }
    }

    fn serve(&self, stream: &mut ConnectionStream) -> io::Result<()> {
        read_head(stream)?;
        let body = self
            .engine
            .upgrade()
            .map_or_else(|| "shutting down\n".to_owned(), |engine| engine.status());
        write!(
            stream,
            concat!(
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: text/plain; charset=utf-8\r\n",
                "Content-Length: {}\r\n",
                "Connection: close\r\n\r\n{}",
            ),
            body.len(),
            body
        )?;
        stream.flush()
    }
}

impl RequestHandler for StatusPage {
    fn handle(&self, mut stream: ConnectionStream) {
        if let Err(error) = self.serve(&mut stream) {
            log_failure(&stream, &error);
        }
    }
}

/// Sends plain-HTTP clients to the TLS listener.
pub(crate) struct TlsRedirect {
    host: String,
    port: String,
}

impl TlsRedirect {
    /// `host` may be empty, in which case the request's Host header is used.
    /// `tls_addr` supplies the port.
    pub(crate) fn new(host: &str, tls_addr: &str) -> Self {
        let port = tls_addr
            .rsplit_once(':')
            .map(|(_, port)| port.to_owned())
            .unwrap_or_default();
        Self {
            host: host.to_owned(),
            port,
        }
    }

    fn location(&self, head: &RequestHead) -> String {
        let host = if self.host.is_empty() {
            let header = head.host.as_deref().unwrap_or_default();
            strip_port(header).to_owned()
        } else {
            self.host.clone()
        };
        if self.port.is_empty() || self.port == HTTPS_PORT {
            format!("https://{host}{}", head.path)
        } else {
            format!("https://{host}:{}{}", self.port, head.path)
        }
    }

    fn serve(&self, stream: &mut ConnectionStream) -> io::Result<()> {
        let head = read_head(stream)?;
        let location = self.location(&head);
        write!(
            stream,
            concat!(
                "HTTP/1.1 302 Found\r\n",
                "Location: {}\r\n",
                "Content-Length: 0\r\n",
                "Connection: close\r\n\r\n",
            ),
            location
        )?;
        stream.flush()
    }
}

impl RequestHandler for TlsRedirect {
    fn handle(&self, mut stream: ConnectionStream) {
        if let Err(error) = self.serve(&mut stream) {
            log_failure(&stream, &error);
        }
    }
}

/// Drops a trailing `:port`, leaving bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
                && (!name.contains(':') || name.ends_with(']')) =>
        {
            name
        }
        _ => host,
    }
}
