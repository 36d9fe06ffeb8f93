use std::io;
use std::sync::{Arc, Weak};
use std::thread;

use runlevel_protocol::Runlevel;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{error, info};

use super::PROCESS_TARGET;
use crate::engine::Engine;

/// Errors reported while installing termination signal handlers.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Registering the handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener thread could not be spawned.
    #[error("failed to spawn signal listener: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Routes the first termination signal into a transition to runlevel 0.
///
/// The iterator handle is parked on the engine so the halt teardown can
/// close it and let the listener thread exit.
pub(crate) fn install(engine: &Arc<Engine>) -> Result<(), SignalError> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
        .map_err(|source| SignalError::Install { source })?;
    engine.attach_signals(signals.handle());
    let engine: Weak<Engine> = Arc::downgrade(engine);
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            let Some(signal) = signals.forever().next() else {
                return;
            };
            info!(
                target: PROCESS_TARGET,
                signal,
                "termination signal received"
            );
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if let Err(error) = engine.transition(Runlevel::Halt) {
                error!(
                    target: PROCESS_TARGET,
                    error = %error,
                    "signal-driven halt failed"
                );
            }
        })
        .map_err(|source| SignalError::Spawn { source })?;
    Ok(())
}
