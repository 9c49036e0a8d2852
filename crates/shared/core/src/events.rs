use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier for a registered event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(Uuid);

impl HandlerId {
    pub fn new() -> Self {
        HandlerId(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Canonical kind of an inbound event.
///
/// Closed set: a topic that does not map onto one of these kinds is rejected
/// at registration time rather than discovered to be unroutable later.
/// `Ack` covers request/response correlation frames (subscribe results,
/// command errors) so one-shot waiters can match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Trade,
    Depth,
    Ticker,
    Kline,
    Ack,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Trade => "trade",
            EventKind::Depth => "depth",
            EventKind::Ticker => "ticker",
            EventKind::Kline => "kline",
            EventKind::Ack => "ack",
        }
    }

    /// Resolve a channel name to its canonical kind.
    ///
    /// Periodic channels carry an interval suffix (`kline_1h`) and some
    /// carry a cadence suffix after a second separator (`depth@100ms`);
    /// both are stripped before lookup.
    pub fn from_channel(channel: &str) -> Option<Self> {
        let base = channel.split('@').next().unwrap_or(channel);
        let base = base.split('_').next().unwrap_or(base);
        match base {
            "trade" => Some(EventKind::Trade),
            "depth" => Some(EventKind::Depth),
            "ticker" => Some(EventKind::Ticker),
            "kline" => Some(EventKind::Kline),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream topic as spoken to the upstream feed.
///
/// Two spellings are in use, matching the two supported wire protocols:
/// `symbol@channel[_interval]` for envelope feeds (`btcusdt@kline_1h`) and
/// `channel:SYMBOL` for frame-array feeds (`trade:XBTUSD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(raw: impl Into<String>) -> Self {
        Topic(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The channel component, without symbol or suffixes.
    pub fn channel(&self) -> &str {
        if let Some((_, channel)) = self.0.split_once('@') {
            channel.split('@').next().unwrap_or(channel)
        } else {
            self.0.split(':').next().unwrap_or(&self.0)
        }
    }

    /// Canonical event kind this topic delivers, if recognized.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_channel(self.channel())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Topic {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Topic::new(s))
    }
}
