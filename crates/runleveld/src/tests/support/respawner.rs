use std::sync::atomic::{AtomicUsize, Ordering};

use crate::process::{RespawnError, Respawner};

/// Counts respawn requests instead of launching anything.
#[derive(Debug, Default)]
pub struct RecordingRespawner {
    calls: AtomicUsize,
}

impl RecordingRespawner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Respawner for RecordingRespawner {
    fn respawn(&self) -> Result<(), RespawnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
