pub mod config;
pub mod handle;
pub mod heartbeat;
pub mod rate_limiter;
pub mod router;
pub mod session;
pub mod supervisor;
pub mod waiters;

pub use config::{GatewayConfig, RateLimitConfig};
pub use handle::{GatewayHandle, GatewayNotice, GatewayShared};
pub use heartbeat::Heartbeat;
pub use rate_limiter::RateLimiter;
pub use router::{MessageRouter, SubscribeError, SubscriptionRegistry};
pub use session::{GatewaySender, GatewaySession, SessionOutcome};
pub use supervisor::ConnectionSupervisor;
pub use waiters::{EventWaiterRegistry, WaiterError, WaiterHandle, WaiterPredicate, WaiterTransform};
