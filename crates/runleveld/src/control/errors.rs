use std::io;
use std::time::Duration;

use runlevel_config::SocketPreparationError;
use runlevel_protocol::ClientError;
use thiserror::Error;

use crate::transport::ListenerError;

/// Conditions that abort supervisor construction.
///
/// None of these are retried by the supervisor; the process is expected to
/// exit.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The control socket directory could not be prepared.
    #[error(transparent)]
    SocketDirectory(#[from] SocketPreparationError),
    /// The control socket path could not be resolved.
    #[error("control socket unusable: {0}")]
    Client(#[source] ClientError),
    /// Another process owns the socket and kicking is disabled.
    #[error("already running: another process owns control socket {path}")]
    AlreadyRunning {
        /// Control socket path.
        path: String,
    },
    /// The occupant declined to vacate.
    #[error("process on control socket {path} refused to vacate: {reply}")]
    KickRefused {
        /// Control socket path.
        path: String,
        /// The occupant's reply.
        reply: String,
    },
    /// Sending the kick failed for a reason other than the occupant exiting.
    #[error("failed to kick process on control socket {path}: {source}")]
    Kick {
        /// Control socket path.
        path: String,
        /// Client failure.
        #[source]
        source: ClientError,
    },
    /// A stale socket file could not be removed.
    #[error("failed to remove stale control socket {path}: {source}")]
    StaleSocket {
        /// Control socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The occupant never released the socket, or stale files kept
    /// reappearing.
    #[error("control socket {path} still contended after {attempts} attempts")]
    Contended {
        /// Control socket path.
        path: String,
        /// Attempts made.
        attempts: usize,
    },
    /// Binding the control socket failed.
    #[error("failed to bind control socket: {0}")]
    Bind(#[source] ListenerError),
    /// Socket permissions could not be restricted.
    #[error("failed to set permissions on control socket {path}: {source}")]
    Permissions {
        /// Control socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The startup bind did not complete in time.
    #[error("control socket was not bound within {}ms", .timeout.as_millis())]
    BindTimeout {
        /// Configured bound.
        timeout: Duration,
    },
    /// The negotiation thread exited without a result.
    #[error("control socket negotiation aborted")]
    NegotiationAborted,
    /// A supervisor thread could not be spawned.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        /// Thread purpose.
        thread: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The control accept loop could not start.
    #[error("failed to start control socket: {0}")]
    Start(#[source] ListenerError),
}
