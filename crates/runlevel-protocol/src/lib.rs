//! Wire vocabulary shared by the runlevel supervisor and its clients.
//!
//! Each control connection carries exactly one request and one reply, both
//! encoded as a single JSON line. The command text inside a request follows
//! the grammar parsed by [`Command::parse`].

mod client;
mod command;
mod framing;
mod level;
mod message;

pub use client::{CONNECTION_TIMEOUT, ClientError, ControlClient};
pub use command::{Command, CommandParseError, ToolKind};
pub use framing::{FramingError, MAX_MESSAGE_BYTES, read_line, write_message};
pub use level::{Runlevel, RunlevelError};
pub use message::{Reply, Request};
