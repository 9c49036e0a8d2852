//! Gateway Crate
//!
//! Resilient streaming-gateway client: one long-lived duplex connection per
//! upstream feed, supervised across reconnects.
//!
//! # Architecture
//!
//! The gateway:
//! - Dials upstream feeds over a pluggable transport (WebSocket in
//!   production, channel pairs in tests)
//! - Runs one receive loop per connection epoch, delivering decoded events
//!   in order to subscribers and one-shot waiters
//! - Monitors liveness in the background and force-closes stalled
//!   connections
//! - Rate-limits every outbound command through a single token bucket
//! - Reconnects with capped, jittered backoff while closures stay resumable
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                ConnectionSupervisor                  │
//! │   reconnect loop · backoff · subscription replay     │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │               GatewaySession                   │  │
//! │  │  receive loop ── MessageRouter ── handlers     │  │
//! │  │       │                └────────── waiters     │  │
//! │  │  HeartbeatMonitor (task)   RateLimiter (gate)  │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ Connector (WebSocket / mock)
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Upstream   │
//!                     └─────────────┘
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export key types
pub use domain::backoff::{BackoffConfig, BackoffPolicy};
pub use domain::frames::{DecodeError, DecodedFrame, Handshake};
pub use domain::state::ConnectionState;
pub use domain::traits::{EventCallback, ProtocolAdapter};

pub use application::config::{GatewayConfig, RateLimitConfig};
pub use application::handle::{GatewayHandle, GatewayNotice, GatewayShared};
pub use application::heartbeat::Heartbeat;
pub use application::rate_limiter::RateLimiter;
pub use application::router::{MessageRouter, SubscribeError, SubscriptionRegistry};
pub use application::session::{GatewaySender, GatewaySession, SessionOutcome};
pub use application::supervisor::ConnectionSupervisor;
pub use application::waiters::{
    EventWaiterRegistry, WaiterError, WaiterHandle, WaiterPredicate, WaiterTransform,
};

pub use infrastructure::protocols::{EnvelopeProtocol, FrameArrayProtocol};
pub use infrastructure::ws::WsConnector;

pub use config::{ConfigError, GatewayConfigFile, load_config, load_default_config};
