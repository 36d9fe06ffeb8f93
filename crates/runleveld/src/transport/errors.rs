//! Error types for listener operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listen address could not be resolved.
    #[error("failed to resolve listen address {address}: {source}")]
    Resolve {
        /// Configured address.
        address: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Resolution produced no usable address.
    #[error("no addresses resolved for {address}")]
    ResolveEmpty {
        /// Configured address.
        address: String,
    },
    /// Binding a TCP socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are unavailable on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for {path}")]
    UnsupportedUnix {
        /// Configured path.
        path: String,
    },
    /// Binding a Unix socket failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A live process already accepts on the socket path.
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// The path exists but is not a socket.
    #[cfg(unix)]
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Socket path.
        path: String,
    },
    /// Inspecting an existing socket path failed.
    #[cfg(unix)]
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing an existing socket failed unexpectedly.
    #[cfg(unix)]
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A stale socket file could not be removed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A TLS listener is configured without certificate and key files.
    #[error("TLS listener {address} requires tls_cert_file and tls_key_file")]
    TlsNotConfigured {
        /// Listener address.
        address: String,
    },
    /// The certificate or key could not be read.
    #[error("failed to read TLS material from {path}: {message}")]
    TlsMaterial {
        /// File that failed to load.
        path: String,
        /// Decoder message.
        message: String,
    },
    /// The certificate pair was rejected.
    #[error("invalid TLS certificate pair: {source}")]
    TlsConfig {
        /// Error reported by rustls.
        #[source]
        source: rustls::Error,
    },
    /// The accept loop thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
