//! The control socket: startup ownership negotiation and command dispatch.

mod commands;
mod dispatch;
mod errors;
mod negotiate;

pub use self::commands::{CommandError, ToolError};
pub(crate) use self::commands::CommandSet;
pub(crate) use self::dispatch::ControlHandler;
pub use self::errors::StartupError;
pub(crate) use self::negotiate::{STARTUP_TIMEOUT, claim_control_socket};

const CONTROL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::control");
