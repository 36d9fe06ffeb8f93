//! Process-level plumbing: signal handling and self re-execution.

mod respawn;
mod signals;

pub use self::respawn::{RespawnError, Respawner, SystemRespawner};
pub use self::signals::SignalError;
pub(crate) use self::signals::install as install_signal_handlers;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
