use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for transport operations
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Failed to establish the connection
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Outbound or inbound channel is closed
    #[error("channel closed")]
    ChannelClosed,

    /// IO error on an established connection
    #[error("IO error: {0}")]
    Io(String),

    /// Timeout
    #[error("timeout")]
    Timeout,
}

/// Frame written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Transport-level ping (carries an opaque payload)
    Ping(Vec<u8>),
    /// Begin the close handshake with the given code
    Close { code: u16 },
}

/// Frame read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Transport-level pong, answering one of our pings
    Pong(Vec<u8>),
    /// The peer completed (or initiated) a close handshake
    Closed { code: Option<u16> },
    /// Read-side failure; the connection is no longer usable
    Error(String),
}

/// An established duplex connection.
///
/// Both halves are channel handles: the transport implementation owns the
/// socket and pumps frames between it and these channels. Dropping the
/// outbound sender tears the write half down; the inbound receiver yielding
/// `None` means the read half is gone.
pub struct Connection {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

/// Port for establishing duplex connections
///
/// Production uses a WebSocket implementation; tests wire the two channel
/// halves straight to an in-process counterparty.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}
