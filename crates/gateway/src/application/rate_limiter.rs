use chrono::Duration as ChronoDuration;
use hermes_core::Timestamp;
use hermes_ports::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::config::RateLimitConfig;

struct LimiterState {
    remaining: u32,
    window_start: Option<Timestamp>,
}

/// Sliding-window token bucket guarding outbound sends.
///
/// `acquire` is the single critical section: it either takes a token and
/// returns zero, or returns how long the caller must wait for the window to
/// roll over. Token accounting never goes below zero.
pub struct RateLimiter {
    capacity: u32,
    window: ChronoDuration,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        RateLimiter {
            capacity: config.capacity,
            // Fallback stays small enough that window arithmetic cannot
            // overflow timestamp range.
            window: ChronoDuration::from_std(config.window)
                .unwrap_or_else(|_| ChronoDuration::days(365 * 100)),
            clock,
            state: Mutex::new(LimiterState {
                remaining: config.capacity,
                window_start: None,
            }),
        }
    }

    /// Take a token if one is available; otherwise return the delay until
    /// the current window resets. A zero return means the send may proceed
    /// immediately.
    pub fn acquire(&self) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let start = *state.window_start.get_or_insert(now);
        if now > start + self.window {
            state.remaining = self.capacity;
            state.window_start = Some(now);
        }

        if state.remaining == 0 {
            let window_end = state.window_start.unwrap_or(now) + self.window;
            return (window_end - now).to_std().unwrap_or(Duration::ZERO);
        }

        state.remaining -= 1;
        Duration::ZERO
    }

    /// Whether the next `acquire` would have to wait.
    pub fn is_limited(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.lock();
        match state.window_start {
            Some(start) if now > start + self.window => false,
            _ => state.remaining == 0,
        }
    }

    /// Acquire and sleep out any returned delay.
    pub async fn throttle(&self) {
        let delay = self.acquire();
        if !delay.is_zero() {
            warn!(delay_ms = delay.as_millis() as u64, "rate limited, waiting");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_clock::ManualClock;

    fn limiter(capacity: u32, window: Duration) -> (RateLimiter, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        let config = RateLimitConfig { capacity, window };
        (RateLimiter::new(&config, clock.clone()), clock)
    }

    #[test]
    fn test_tokens_within_capacity_are_free() {
        let (limiter, _clock) = limiter(3, Duration::from_secs(1));
        assert_eq!(limiter.acquire(), Duration::ZERO);
        assert_eq!(limiter.acquire(), Duration::ZERO);
        assert_eq!(limiter.acquire(), Duration::ZERO);
    }

    #[test]
    fn test_fourth_acquire_waits_for_window_reset() {
        let (limiter, clock) = limiter(3, Duration::from_secs(1));
        for _ in 0..3 {
            assert_eq!(limiter.acquire(), Duration::ZERO);
        }

        clock.advance(ChronoDuration::milliseconds(250));
        let delay = limiter.acquire();
        assert_eq!(delay, Duration::from_millis(750));
        assert!(limiter.is_limited());
    }

    #[test]
    fn test_window_elapse_refills_to_capacity() {
        let (limiter, clock) = limiter(2, Duration::from_secs(1));
        assert_eq!(limiter.acquire(), Duration::ZERO);
        assert_eq!(limiter.acquire(), Duration::ZERO);
        assert!(limiter.is_limited());

        clock.advance(ChronoDuration::milliseconds(1001));
        assert!(!limiter.is_limited());
        assert_eq!(limiter.acquire(), Duration::ZERO);
        assert_eq!(limiter.acquire(), Duration::ZERO);
    }

    #[test]
    fn test_zero_delay_acquisitions_never_exceed_capacity() {
        let (limiter, _clock) = limiter(5, Duration::from_secs(10));
        let granted = (0..20).filter(|_| limiter.acquire().is_zero()).count();
        assert_eq!(granted, 5);
    }
}
