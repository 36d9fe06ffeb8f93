use runlevel_protocol::Runlevel;
use thiserror::Error;

use super::HookError;
use crate::registry::RegistryError;

/// Reasons a runlevel transition did not commit.
///
/// Every variant leaves the committed level unchanged.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The level's hook returned an error.
    #[error("runlevel {level} hook failed: {source}")]
    Hook {
        /// Requested level.
        level: Runlevel,
        /// Error returned by the hook.
        #[source]
        source: HookError,
    },
    /// Listeners could not be opened.
    #[error("runlevel {level} listeners failed: {source}")]
    Listeners {
        /// Requested level.
        level: Runlevel,
        /// Aggregated listener failures.
        #[source]
        source: RegistryError,
    },
    /// Runlevel 0 completed; no further transitions are accepted.
    #[error("supervisor has halted")]
    Halted,
}
