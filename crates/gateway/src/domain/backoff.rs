use hermes_core::is_resumable_code;
use rand::Rng;
use std::time::Duration;

/// Reconnect backoff parameters
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Jitter as a fraction of the capped delay, applied uniformly in
    /// `[-jitter_factor, +jitter_factor]`.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        // 500ms base, 2x growth, 60s cap, ±25% jitter
        Self {
            base_ms: 500,
            max_ms: 60_000,
            multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

/// Computes reconnect delays and classifies closures.
///
/// Expected delay grows as `base * multiplier^attempt` up to the cap;
/// jitter spreads simultaneous reconnectors apart. The owner resets the
/// attempt counter once a connection has proven stable.
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    attempt: u32,
}

impl BackoffPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        BackoffPolicy { config, attempt: 0 }
    }

    /// Whether a closure with this code should be retried at all.
    pub fn classify(&self, code: u16) -> bool {
        is_resumable_code(code)
    }

    /// Delay before attempt number `attempt`, jitter excluded.
    fn expected_delay_ms(&self, attempt: u32) -> f64 {
        let raw = self.config.base_ms as f64 * self.config.multiplier.powi(attempt as i32);
        raw.min(self.config.max_ms as f64)
    }

    /// Delay to wait before the next reconnect attempt. Advances the
    /// attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let expected = self.expected_delay_ms(self.attempt);
        let spread = expected * self.config.jitter_factor;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        self.attempt = self.attempt.saturating_add(1);

        Duration::from_millis((expected + jitter).max(0.0) as u64)
    }

    /// Reset after a connection has stayed open past the stability window.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{CLOSE_ABNORMAL, CLOSE_POLICY_VIOLATION};

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(BackoffConfig::default())
    }

    #[test]
    fn test_expected_delay_is_non_decreasing_and_capped() {
        let policy = policy();
        let mut previous = 0.0;
        for attempt in 0..16 {
            let expected = policy.expected_delay_ms(attempt);
            assert!(expected >= previous, "attempt {attempt} decreased");
            assert!(expected <= policy.config.max_ms as f64);
            previous = expected;
        }
    }

    #[test]
    fn test_next_delay_stays_within_jitter_bounds() {
        let mut policy = policy();
        for attempt in 0..10 {
            let expected = policy.expected_delay_ms(attempt);
            let delay = policy.next_delay().as_millis() as f64;
            let spread = expected * policy.config.jitter_factor;
            assert!(delay >= expected - spread - 1.0);
            assert!(delay <= expected + spread + 1.0);
        }
    }

    #[test]
    fn test_reset_restarts_the_schedule() {
        let mut policy = policy();
        for _ in 0..6 {
            policy.next_delay();
        }
        assert_eq!(policy.attempt(), 6);

        policy.reset();
        assert_eq!(policy.attempt(), 0);
        let delay = policy.next_delay();
        let max_first =
            policy.config.base_ms as f64 * (1.0 + policy.config.jitter_factor) + 1.0;
        assert!((delay.as_millis() as f64) <= max_first);
    }

    #[test]
    fn test_classify_follows_close_codes() {
        let policy = policy();
        assert!(policy.classify(CLOSE_ABNORMAL));
        assert!(!policy.classify(CLOSE_POLICY_VIOLATION));
    }
}
