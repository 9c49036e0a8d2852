use std::time::Duration;

use crate::domain::BackoffConfig;

/// Outbound rate limit: `capacity` sends per sliding `window`.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // 40 commands per hour matches the strictest upstream we speak to
        Self {
            capacity: 40,
            window: Duration::from_secs(60 * 60),
        }
    }
}

/// Full configuration for one supervised gateway connection.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,

    /// Deadline for dialing + transport upgrade
    pub connect_timeout: Duration,

    /// How often the liveness monitor wakes up and probes
    pub heartbeat_interval: Duration,
    /// Inbound silence longer than this closes the connection
    pub heartbeat_timeout: Duration,
    /// Probe round-trips slower than this are logged as falling behind
    pub latency_warn_threshold: Duration,

    pub rate_limit: RateLimitConfig,
    pub backoff: BackoffConfig,

    /// Sessions that stay open at least this long reset the backoff schedule
    pub stability_window: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            latency_warn_threshold: Duration::from_secs(10),
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
            stability_window: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
