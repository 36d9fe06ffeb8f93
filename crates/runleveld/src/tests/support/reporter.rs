//! Test double for [`HealthReporter`] that records lifecycle events.

use std::sync::Mutex;

use runlevel_config::Config;
use runlevel_protocol::Runlevel;

use crate::control::StartupError;
use crate::engine::TransitionError;
use crate::health::HealthReporter;
use crate::process::RespawnError;

/// Lifecycle events captured during a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    StartupNegotiating,
    StartupSucceeded,
    StartupFailed(String),
    Transition { from: Runlevel, to: Runlevel },
    TransitionFailed { from: Runlevel, to: Runlevel },
    Kick { accepted: bool },
    Redeploy,
    RespawnFailed(String),
}

#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Committed transitions, in order.
    pub fn transitions(&self) -> Vec<(Runlevel, Runlevel)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::Transition { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn startup_negotiating(&self, _config: &Config) {
        self.record(HealthEvent::StartupNegotiating);
    }

    fn startup_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::StartupSucceeded);
    }

    fn startup_failed(&self, error: &StartupError) {
        self.record(HealthEvent::StartupFailed(error.to_string()));
    }

    fn transition_completed(&self, from: Runlevel, to: Runlevel) {
        self.record(HealthEvent::Transition { from, to });
    }

    fn transition_failed(&self, from: Runlevel, to: Runlevel, _error: &TransitionError) {
        self.record(HealthEvent::TransitionFailed { from, to });
    }

    fn kick_received(&self, accepted: bool) {
        self.record(HealthEvent::Kick { accepted });
    }

    fn redeploy_requested(&self) {
        self.record(HealthEvent::Redeploy);
    }

    fn respawn_failed(&self, error: &RespawnError) {
        self.record(HealthEvent::RespawnFailed(error.to_string()));
    }
}
