//! Error types for the control client runtime.

use std::io;
use std::sync::Arc;

use runlevel_protocol::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("is the supervisor running? nothing is listening on {socket}")]
    NotRunning { socket: String },
    #[error("failed to write reply: {0}")]
    WriteReply(io::Error),
}
