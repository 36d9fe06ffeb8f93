//! Process-wide log output.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use runlevel_config::{Config, LogFormat};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Errors encountered while installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directive did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber was already registered elsewhere.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(#[source] TryInitError),
}

/// Installs the stderr subscriber described by `config`.
///
/// Only the first call has an effect; later calls return `Ok(())` so tests
/// and embedders may call it freely.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let base = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());
    let output = match config.log_format() {
        LogFormat::Json => base.json().flatten_event(true).boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
