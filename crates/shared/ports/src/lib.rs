//! Hermes Ports
//!
//! Port definitions (traits) for the hermes streaming gateway.
//! These define the boundaries between domain logic and infrastructure.

mod clock;
mod transport;

pub use clock::Clock;
pub use transport::{Connection, Connector, InboundFrame, OutboundFrame, TransportError};
