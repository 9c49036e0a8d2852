use chrono::{Duration, Utc};
use hermes_core::Timestamp;
use hermes_ports::Clock;
use parking_lot::Mutex;
use std::sync::Arc;

/// Manually driven clock for deterministic tests
///
/// Time stands still until `advance` or `set` is called. Handed to timing
/// components (rate limiter, heartbeat) as `Arc<dyn Clock>` so tests can
/// move time forward without sleeping.
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Arc<Self> {
        Arc::new(ManualClock {
            current: Mutex::new(start),
        })
    }

    /// Start at the current wall-clock time; only explicit advances move it.
    pub fn starting_now() -> Arc<Self> {
        Self::new(Utc::now())
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock();
        *current += duration;
    }

    /// Jump to an absolute time. Can move backwards; use with care.
    pub fn set(&self, time: Timestamp) {
        *self.current.lock() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_frozen() {
        let clock = ManualClock::starting_now();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_advance_moves_time() {
        let clock = ManualClock::starting_now();
        let before = clock.now();
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now() - before, Duration::seconds(30));
    }
}
