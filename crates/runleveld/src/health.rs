//! Structured health reporting for supervisor lifecycle events.

use std::sync::Arc;

use runlevel_config::Config;
use runlevel_protocol::Runlevel;

use crate::control::StartupError;
use crate::engine::TransitionError;
use crate::process::RespawnError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the control socket is claimed.
    fn startup_negotiating(&self, config: &Config);

    /// Invoked once the control socket is bound.
    fn startup_succeeded(&self, config: &Config);

    /// Invoked when startup aborts.
    fn startup_failed(&self, error: &StartupError);

    /// Invoked after a transition commits.
    fn transition_completed(&self, from: Runlevel, to: Runlevel);

    /// Invoked when a transition aborts and the level is left unchanged.
    fn transition_failed(&self, from: Runlevel, to: Runlevel, error: &TransitionError);

    /// Invoked when a peer asks this process to vacate.
    fn kick_received(&self, accepted: bool);

    /// Invoked when a redeploy is requested.
    fn redeploy_requested(&self);

    /// Invoked when re-executing the binary fails.
    fn respawn_failed(&self, error: &RespawnError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn startup_negotiating(&self, config: &Config) {
        (**self).startup_negotiating(config);
    }

    fn startup_succeeded(&self, config: &Config) {
        (**self).startup_succeeded(config);
    }

    fn startup_failed(&self, error: &StartupError) {
        (**self).startup_failed(error);
    }

    fn transition_completed(&self, from: Runlevel, to: Runlevel) {
        (**self).transition_completed(from, to);
    }

    fn transition_failed(&self, from: Runlevel, to: Runlevel, error: &TransitionError) {
        (**self).transition_failed(from, to, error);
    }

    fn kick_received(&self, accepted: bool) {
        (**self).kick_received(accepted);
    }

    fn redeploy_requested(&self) {
        (**self).redeploy_requested();
    }

    fn respawn_failed(&self, error: &RespawnError) {
        (**self).respawn_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn startup_negotiating(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "startup_negotiating",
            socket = %config.socket,
            kicks = config.kicks,
            "claiming control socket"
        );
    }

    fn startup_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "startup_succeeded",
            name = %config.name,
            socket = %config.socket,
            default_level = config.default_level(),
            "control socket ready"
        );
    }

    fn startup_failed(&self, error: &StartupError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "startup_failed",
            error = %error,
            "supervisor startup failed"
        );
    }

    fn transition_completed(&self, from: Runlevel, to: Runlevel) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "transition_completed",
            from = from.as_u8(),
            to = to.as_u8(),
            "entered runlevel {to}"
        );
    }

    fn transition_failed(&self, from: Runlevel, to: Runlevel, error: &TransitionError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "transition_failed",
            from = from.as_u8(),
            to = to.as_u8(),
            error = %error,
            "runlevel transition aborted"
        );
    }

    fn kick_received(&self, accepted: bool) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "kick_received",
            accepted,
            "kick request received"
        );
    }

    fn redeploy_requested(&self) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "redeploy_requested",
            "redeploying"
        );
    }

    fn respawn_failed(&self, error: &RespawnError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "respawn_failed",
            error = %error,
            "failed to launch replacement process"
        );
    }
}
