use std::env;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Starts a replacement copy of the running program.
pub trait Respawner: Send + Sync {
    /// Launches the replacement. The caller halts afterwards either way.
    fn respawn(&self) -> Result<(), RespawnError>;
}

/// Errors raised while launching the replacement process.
#[derive(Debug, Error)]
pub enum RespawnError {
    /// The running executable could not be located.
    #[error("failed to resolve current executable: {source}")]
    CurrentExe {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Spawning the replacement failed.
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        /// Program that was launched.
        program: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Re-executes the current binary with the original arguments and
/// environment.
///
/// The replacement inherits stdout and stderr and begins its own startup
/// negotiation, kicking this process off the control socket if it is still
/// there.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRespawner;

impl Respawner for SystemRespawner {
    fn respawn(&self) -> Result<(), RespawnError> {
        let program = env::current_exe().map_err(|source| RespawnError::CurrentExe { source })?;
        let child = Command::new(&program)
            .args(env::args_os().skip(1))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RespawnError::Spawn {
                program: program.clone(),
                source,
            })?;
        info!(
            target: PROCESS_TARGET,
            pid = child.id(),
            program = %program.display(),
            "replacement process started"
        );
        Ok(())
    }
}
