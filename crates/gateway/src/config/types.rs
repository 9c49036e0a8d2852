use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::application::config::{GatewayConfig, RateLimitConfig};
use crate::domain::{BackoffConfig, ProtocolAdapter};
use crate::infrastructure::{EnvelopeProtocol, FrameArrayProtocol};

/// Top-level gateway configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigFile {
    pub gateways: Vec<EndpointConfig>,
}

/// Which wire protocol an endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Envelope,
    FrameArray,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSection {
    pub capacity: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSection {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSection {
    pub base_ms: u64,
    pub max_ms: u64,
}

/// One configured upstream endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub protocol: ProtocolKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSection>,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatSection>,
    #[serde(default)]
    pub backoff: Option<BackoffSection>,
}

fn default_enabled() -> bool {
    true
}

impl EndpointConfig {
    /// Runtime configuration for this endpoint, file sections layered over
    /// the built-in defaults.
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::for_url(self.url.clone());
        if let Some(rate_limit) = &self.rate_limit {
            config.rate_limit = RateLimitConfig {
                capacity: rate_limit.capacity,
                window: Duration::from_secs(rate_limit.window_secs),
            };
        }
        if let Some(heartbeat) = &self.heartbeat {
            config.heartbeat_interval = Duration::from_secs(heartbeat.interval_secs);
            config.heartbeat_timeout = Duration::from_secs(heartbeat.timeout_secs);
        }
        if let Some(backoff) = &self.backoff {
            config.backoff = BackoffConfig {
                base_ms: backoff.base_ms,
                max_ms: backoff.max_ms,
                ..BackoffConfig::default()
            };
        }
        config
    }

    /// Protocol adapter for this endpoint.
    pub fn adapter(&self) -> Arc<dyn ProtocolAdapter> {
        match self.protocol {
            ProtocolKind::Envelope => Arc::new(EnvelopeProtocol::new()),
            ProtocolKind::FrameArray => Arc::new(FrameArrayProtocol::new(0, self.id.clone())),
        }
    }
}
