//! Named connection counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Connections opened within the last grace period.
pub(crate) const ACTIVE: &str = "active";
/// Connections accepted since start.
pub(crate) const TOTAL: &str = "total";

/// Delay before a closed connection stops counting as active.
pub const DEFAULT_ACTIVE_GRACE: Duration = Duration::from_secs(2);

/// Concurrency-safe named counters guarded by their own lock.
#[derive(Debug, Default)]
pub(crate) struct ConnectionCounters {
    counts: Mutex<HashMap<String, u64>>,
}

impl ConnectionCounters {
    /// Creates empty counters.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Increments every named counter by one.
    pub(crate) fn up(&self, names: &[&str]) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        for name in names {
            let count = counts.entry((*name).to_owned()).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    /// Decrements a counter, saturating at zero.
    pub(crate) fn down(&self, name: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }

    /// Reads a counter; unknown names read as zero.
    #[must_use]
    pub(crate) fn get(&self, name: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

/// Connection-state observer installed on every public listener.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionAccounting {
    counters: Arc<ConnectionCounters>,
    grace: Duration,
}

impl ConnectionAccounting {
    pub(crate) const fn new(counters: Arc<ConnectionCounters>, grace: Duration) -> Self {
        Self { counters, grace }
    }

    pub(crate) fn opened(&self) {
        self.counters.up(&[TOTAL, ACTIVE]);
    }

    /// Runs on the connection's own thread once the stream is dropped.
    pub(crate) fn closed(&self) {
        if !self.grace.is_zero() {
            thread::sleep(self.grace);
        }
        self.counters.down(ACTIVE);
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn counters() -> ConnectionCounters {
        ConnectionCounters::new()
    }

    #[rstest]
    fn unknown_counters_read_zero(counters: ConnectionCounters) {
        assert_eq!(counters.get(ACTIVE), 0);
        counters.down(ACTIVE);
        assert_eq!(counters.get(ACTIVE), 0);
    }

    #[rstest]
    fn up_increments_each_name(counters: ConnectionCounters) {
        counters.up(&[TOTAL, ACTIVE]);
        counters.up(&[TOTAL, ACTIVE]);
        counters.down(ACTIVE);
        assert_eq!(counters.get(TOTAL), 2);
        assert_eq!(counters.get(ACTIVE), 1);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let counters = Arc::new(ConnectionCounters::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                thread::spawn(move || {
                    for _ in 0..100 {
                        counters.up(&[TOTAL]);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("join worker");
        }
        assert_eq!(counters.get(TOTAL), 800);
    }

    #[test]
    fn accounting_releases_active_after_close() {
        let counters = Arc::new(ConnectionCounters::new());
        let accounting = ConnectionAccounting::new(Arc::clone(&counters), Duration::ZERO);
        accounting.opened();
        assert_eq!(counters.get(ACTIVE), 1);
        accounting.closed();
        assert_eq!(counters.get(ACTIVE), 0);
        assert_eq!(counters.get(TOTAL), 1);
    }
}
