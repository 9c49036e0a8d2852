use std::fmt;

/// Connection lifecycle states
///
/// Owned exclusively by the session; every transition goes through its
/// `set_state`. Observers read through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport yet
    #[default]
    Disconnected,
    /// Dialing the peer
    Connecting,
    /// Transport up, identify/subscribe-replay in flight
    Handshaking,
    /// Receive loop running, events flowing
    Open,
    /// Close handshake in progress
    Closing,
    /// Terminal; the session object is discarded after this
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Handshaking => write!(f, "HANDSHAKING"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Closing => write!(f, "CLOSING"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}
