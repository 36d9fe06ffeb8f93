//! Foreground entry point used by the `runleveld` binary.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::{info, warn};

use runlevel_config::Config;

use crate::control::StartupError;
use crate::supervisor::{StartError, SupervisorBuilder};
use crate::telemetry::{self, TelemetryError};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Errors that end the daemon before it reaches runlevel 0 on its own.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<OrthoError>),
    /// Logging could not be installed.
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    /// The control socket could not be claimed.
    #[error(transparent)]
    Startup(#[from] StartupError),
    /// Signal handling could not be installed.
    #[error(transparent)]
    Start(#[from] StartError),
}

/// Runs a supervisor serving the built-in status page until it halts.
///
/// # Errors
///
/// Returns [`DaemonError`] when the control socket cannot be claimed or
/// signals cannot be installed. Failing to enter the default level is
/// logged and the daemon stays at its current level, reachable over the
/// control socket, until a signal or control command halts it.
pub fn run_daemon(config: Config) -> Result<(), DaemonError> {
    telemetry::initialise(&config)?;
    let supervisor = SupervisorBuilder::new(config).build()?;
    match supervisor.start() {
        Ok(()) => {}
        Err(StartError::Transition(error)) => warn!(
            target: DAEMON_TARGET,
            %error,
            level = supervisor.level().as_u8(),
            "default runlevel not entered; awaiting control commands"
        ),
        Err(error) => return Err(error.into()),
    }
    supervisor.wait();
    info!(
        target: DAEMON_TARGET,
        uptime_secs = supervisor.uptime().as_secs(),
        "supervisor halted"
    );
    Ok(())
}
