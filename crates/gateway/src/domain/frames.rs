use hermes_core::EventKind;
use hermes_ports::OutboundFrame;
use serde_json::Value;
use thiserror::Error;

/// A single inbound frame decode failure. Never fatal to the connection:
/// the receive loop logs it and moves on to the next frame.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized stream: {0}")]
    UnknownStream(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Result of decoding one inbound frame, protocol details erased.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A data event for subscribers and waiters
    Event { kind: EventKind, payload: Value },
    /// Response to one of our requests, correlated by id
    Ack { id: Option<u64>, result: Option<Value> },
    /// The peer rejected one of our requests
    ApiError {
        id: Option<u64>,
        code: i64,
        msg: String,
    },
    /// Application-level heartbeat acknowledgement
    Pong,
}

/// What a protocol sends right after the transport comes up, and whether
/// the session should hold in `Handshaking` until an ack arrives.
#[derive(Debug)]
pub struct Handshake {
    pub frames: Vec<OutboundFrame>,
    /// Request id whose ack completes the handshake; `None` opens
    /// immediately after the frames are flushed.
    pub await_ack: Option<u64>,
}

impl Handshake {
    pub fn immediate(frames: Vec<OutboundFrame>) -> Self {
        Handshake {
            frames,
            await_ack: None,
        }
    }

    pub fn until_ack(frames: Vec<OutboundFrame>, id: u64) -> Self {
        Handshake {
            frames,
            await_ack: Some(id),
        }
    }
}
