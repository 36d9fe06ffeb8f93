//! Runlevel lifecycle supervisor for long-running network services.
//!
//! A [`Supervisor`] owns a set of public listeners (TCP, TLS and Unix
//! domain) and opens or closes them as the process moves between runlevels:
//!
//! | Level | Meaning |
//! |---|---|
//! | 0 | Halt: tear down and let the process exit |
//! | 1 | Single user: control socket only |
//! | 2 | Transitional: hooks run, listeners stay closed |
//! | 3 | Multi user: listeners open |
//! | 4 | Custom multi user |
//!
//! Transitions are serialized. Signals, control commands and direct API
//! calls all funnel into the same engine, and a failed transition leaves the
//! level where it was.
//!
//! The control socket is a Unix-domain socket restricted by filesystem
//! permissions. It is claimed at construction and doubles as a singleton
//! lock: a second instance asks the first to vacate with `KICK`, which is
//! also how `redeploy` hands over to a freshly spawned copy of the binary.
//! Each connection carries one JSON request line and one JSON reply line;
//! see [`runlevel_protocol`].
//!
//! ```no_run
//! use runlevel_config::Config;
//! use runleveld::SupervisorBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = SupervisorBuilder::new(Config::default()).build()?;
//! supervisor.start()?;
//! supervisor.wait();
//! # Ok(())
//! # }
//! ```

mod control;
mod counters;
mod daemon;
mod engine;
mod handlers;
mod health;
mod process;
mod registry;
mod supervisor;
pub mod telemetry;
mod transport;

pub use control::{CommandError, StartupError, ToolError};
pub use counters::DEFAULT_ACTIVE_GRACE;
pub use daemon::{DaemonError, run_daemon};
pub use engine::{HookError, TransitionError};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{RespawnError, Respawner, SignalError, SystemRespawner};
pub use registry::{ListenerFailure, ListenerFailures, RegistryError};
pub use supervisor::{StartError, Supervisor, SupervisorBuilder};
pub use transport::{ConnectionStream, ListenerError, RequestHandler};

#[cfg(test)]
mod tests;
