use hermes_core::Topic;
use hermes_ports::OutboundFrame;
use serde_json::Value;
use std::sync::Arc;

use super::frames::{DecodeError, DecodedFrame, Handshake};

/// Handler invoked for every event delivered on a subscribed topic.
///
/// Called from the receive loop, so implementations must be quick; anything
/// slow should hand off to its own task.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wire protocol strategy for one upstream feed.
///
/// Two shapes exist in the wild: a structured envelope carrying a stream
/// name and a data body, and a positional array carrying an operation code
/// and payload. Implementations own both directions - decoding inbound
/// frames into [`DecodedFrame`] and building the outbound command frames.
pub trait ProtocolAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode one raw text frame.
    fn decode(&self, raw: &str) -> Result<DecodedFrame, DecodeError>;

    /// Frames to send as soon as the transport is up, replaying `topics`.
    fn handshake(&self, id: u64, topics: &[Topic]) -> Handshake;

    /// Subscription request for `topics`, correlated by `id`.
    fn subscribe_frame(&self, id: u64, topics: &[Topic]) -> OutboundFrame;

    /// Unsubscription request for `topics`, correlated by `id`.
    fn unsubscribe_frame(&self, id: u64, topics: &[Topic]) -> OutboundFrame;

    /// Liveness probe frame. Transport-level ping for protocols that use
    /// it, an application-level frame for those that speak ping in band.
    fn heartbeat_frame(&self) -> OutboundFrame;
}
