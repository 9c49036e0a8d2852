use hermes_core::{EventKind, Topic};
use hermes_ports::OutboundFrame;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{DecodeError, DecodedFrame, Handshake, ProtocolAdapter};

/// Request messages for envelope-style feeds
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
enum EnvelopeRequest {
    Subscribe { id: u64, params: Vec<String> },
    Unsubscribe { id: u64, params: Vec<String> },
}

/// Response messages for envelope-style feeds
///
/// Order matters: errors carry an id too, so they must be tried before the
/// plain result shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvelopeResponse {
    Error {
        id: Option<u64>,
        code: i64,
        msg: String,
    },
    Result {
        id: u64,
        result: Option<Value>,
    },
    Stream {
        stream: String,
        data: Value,
    },
}

/// Structured-envelope upstream protocol.
///
/// Frames are JSON objects: stream events as `{stream, data}`, command
/// results as `{id, result}`. Subscriptions are replayed in the handshake
/// and the session holds in `Handshaking` until the replay is acknowledged.
/// Liveness probes ride transport-level ping/pong.
pub struct EnvelopeProtocol;

impl EnvelopeProtocol {
    pub fn new() -> Self {
        EnvelopeProtocol
    }

    fn request_frame(&self, request: &EnvelopeRequest) -> OutboundFrame {
        // Serialization of these shapes cannot fail; fall back to an empty
        // object rather than poisoning the send path.
        let text = serde_json::to_string(request)
            .unwrap_or_else(|_| "{}".to_string());
        OutboundFrame::Text(text)
    }
}

impl Default for EnvelopeProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter for EnvelopeProtocol {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn decode(&self, raw: &str) -> Result<DecodedFrame, DecodeError> {
        match serde_json::from_str::<EnvelopeResponse>(raw)? {
            EnvelopeResponse::Stream { stream, data } => {
                let topic = Topic::new(stream);
                let kind = topic
                    .kind()
                    .ok_or_else(|| DecodeError::UnknownStream(topic.as_str().to_string()))?;
                Ok(DecodedFrame::Event {
                    kind,
                    payload: data,
                })
            }
            EnvelopeResponse::Result { id, result } => Ok(DecodedFrame::Ack {
                id: Some(id),
                result,
            }),
            EnvelopeResponse::Error { id, code, msg } => {
                Ok(DecodedFrame::ApiError { id, code, msg })
            }
        }
    }

    fn handshake(&self, id: u64, topics: &[Topic]) -> Handshake {
        if topics.is_empty() {
            return Handshake::immediate(Vec::new());
        }
        Handshake::until_ack(vec![self.subscribe_frame(id, topics)], id)
    }

    fn subscribe_frame(&self, id: u64, topics: &[Topic]) -> OutboundFrame {
        self.request_frame(&EnvelopeRequest::Subscribe {
            id,
            params: topics.iter().map(|t| t.as_str().to_string()).collect(),
        })
    }

    fn unsubscribe_frame(&self, id: u64, topics: &[Topic]) -> OutboundFrame {
        self.request_frame(&EnvelopeRequest::Unsubscribe {
            id,
            params: topics.iter().map(|t| t.as_str().to_string()).collect(),
        })
    }

    fn heartbeat_frame(&self) -> OutboundFrame {
        OutboundFrame::Ping(Vec::new())
    }
}

// Multiplexing op codes of the frame-array protocol
const OP_MESSAGE: u64 = 0;
const OP_SUBSCRIBE: u64 = 1;
const OP_UNSUBSCRIBE: u64 = 2;

/// Positional-array upstream protocol.
///
/// Frames are JSON arrays `[op, shard, session, payload]`; data payloads
/// carry `table`/`action`/`data`. The handshake identifies the session and
/// replays subscriptions, then opens immediately - there is no ack to wait
/// for. Liveness probes are in-band `ping`/`pong` text frames.
pub struct FrameArrayProtocol {
    shard: u64,
    session: String,
}

impl FrameArrayProtocol {
    pub fn new(shard: u64, session: impl Into<String>) -> Self {
        FrameArrayProtocol {
            shard,
            session: session.into(),
        }
    }

    fn table_kind(table: &str) -> Option<EventKind> {
        if table.starts_with("tradeBin") {
            return Some(EventKind::Kline);
        }
        match table {
            "trade" => Some(EventKind::Trade),
            "orderBookL2" | "orderBook10" => Some(EventKind::Depth),
            "instrument" | "quote" => Some(EventKind::Ticker),
            _ => None,
        }
    }

    fn command_frame(&self, op: &str, id: u64, topics: &[Topic]) -> OutboundFrame {
        let args: Vec<&str> = topics.iter().map(|t| t.as_str()).collect();
        let frame = json!([
            OP_MESSAGE,
            self.shard,
            self.session,
            { "op": op, "args": args, "id": id },
        ]);
        OutboundFrame::Text(frame.to_string())
    }
}

impl ProtocolAdapter for FrameArrayProtocol {
    fn name(&self) -> &'static str {
        "frame-array"
    }

    fn decode(&self, raw: &str) -> Result<DecodedFrame, DecodeError> {
        if raw == "pong" {
            return Ok(DecodedFrame::Pong);
        }

        let value: Value = serde_json::from_str(raw)?;
        let frame = value
            .as_array()
            .ok_or_else(|| DecodeError::Malformed("expected positional array".to_string()))?;
        let op = frame
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| DecodeError::Malformed("missing op code".to_string()))?;

        match op {
            OP_SUBSCRIBE | OP_UNSUBSCRIBE => Ok(DecodedFrame::Ack {
                id: None,
                result: None,
            }),
            OP_MESSAGE => {
                let payload = frame
                    .get(3)
                    .ok_or_else(|| DecodeError::Malformed("missing payload".to_string()))?;

                if let Some(error) = payload.get("error") {
                    return Ok(DecodedFrame::ApiError {
                        id: payload.get("id").and_then(Value::as_u64),
                        code: payload.get("status").and_then(Value::as_i64).unwrap_or(0),
                        msg: error.as_str().unwrap_or("unknown error").to_string(),
                    });
                }
                if payload.get("success").is_some() {
                    return Ok(DecodedFrame::Ack {
                        id: payload.get("id").and_then(Value::as_u64),
                        result: Some(payload.clone()),
                    });
                }

                let table = payload
                    .get("table")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DecodeError::Malformed("missing table".to_string()))?;
                let kind = Self::table_kind(table)
                    .ok_or_else(|| DecodeError::UnknownStream(table.to_string()))?;
                Ok(DecodedFrame::Event {
                    kind,
                    payload: payload.clone(),
                })
            }
            other => Err(DecodeError::Malformed(format!("unknown op code {other}"))),
        }
    }

    fn handshake(&self, id: u64, topics: &[Topic]) -> Handshake {
        let identify = json!([OP_SUBSCRIBE, self.shard, self.session]);
        let mut frames = vec![OutboundFrame::Text(identify.to_string())];
        if !topics.is_empty() {
            frames.push(self.subscribe_frame(id, topics));
        }
        Handshake::immediate(frames)
    }

    fn subscribe_frame(&self, id: u64, topics: &[Topic]) -> OutboundFrame {
        self.command_frame("subscribe", id, topics)
    }

    fn unsubscribe_frame(&self, id: u64, topics: &[Topic]) -> OutboundFrame {
        self.command_frame("unsubscribe", id, topics)
    }

    fn heartbeat_frame(&self) -> OutboundFrame {
        OutboundFrame::Text("ping".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_decodes_stream_events() {
        let protocol = EnvelopeProtocol::new();
        let frame = protocol
            .decode(r#"{"stream":"btcusdt@ticker","data":{"c":"50000.00"}}"#)
            .unwrap();
        match frame {
            DecodedFrame::Event { kind, payload } => {
                assert_eq!(kind, EventKind::Ticker);
                assert_eq!(payload["c"], "50000.00");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_strips_interval_suffix() {
        let protocol = EnvelopeProtocol::new();
        let frame = protocol
            .decode(r#"{"stream":"ethusdt@kline_1h","data":{"t":0}}"#)
            .unwrap();
        assert!(matches!(
            frame,
            DecodedFrame::Event {
                kind: EventKind::Kline,
                ..
            }
        ));
    }

    #[test]
    fn test_envelope_decodes_acks_and_errors() {
        let protocol = EnvelopeProtocol::new();

        let ack = protocol.decode(r#"{"id":3,"result":null}"#).unwrap();
        assert_eq!(
            ack,
            DecodedFrame::Ack {
                id: Some(3),
                result: None
            }
        );

        let error = protocol
            .decode(r#"{"id":4,"code":2,"msg":"invalid stream"}"#)
            .unwrap();
        assert_eq!(
            error,
            DecodedFrame::ApiError {
                id: Some(4),
                code: 2,
                msg: "invalid stream".to_string()
            }
        );
    }

    #[test]
    fn test_envelope_rejects_unknown_streams() {
        let protocol = EnvelopeProtocol::new();
        let result = protocol.decode(r#"{"stream":"btcusdt@funding","data":{}}"#);
        assert!(matches!(result, Err(DecodeError::UnknownStream(_))));
    }

    #[test]
    fn test_envelope_subscribe_frame_shape() {
        let protocol = EnvelopeProtocol::new();
        let OutboundFrame::Text(text) =
            protocol.subscribe_frame(7, &[Topic::new("btcusdt@depth")])
        else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["id"], 7);
        assert_eq!(value["params"][0], "btcusdt@depth");
    }

    #[test]
    fn test_envelope_handshake_waits_for_replay_ack() {
        let protocol = EnvelopeProtocol::new();
        let handshake = protocol.handshake(1, &[Topic::new("btcusdt@trade")]);
        assert_eq!(handshake.frames.len(), 1);
        assert_eq!(handshake.await_ack, Some(1));

        let empty = protocol.handshake(1, &[]);
        assert!(empty.frames.is_empty());
        assert_eq!(empty.await_ack, None);
    }

    #[test]
    fn test_frame_array_decodes_table_events() {
        let protocol = FrameArrayProtocol::new(0, "md");
        let raw = r#"[0,0,"md",{"table":"trade","action":"insert","data":[{"price":97.1}]}]"#;
        let frame = protocol.decode(raw).unwrap();
        match frame {
            DecodedFrame::Event { kind, payload } => {
                assert_eq!(kind, EventKind::Trade);
                assert_eq!(payload["action"], "insert");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_array_maps_tables_to_kinds() {
        assert_eq!(
            FrameArrayProtocol::table_kind("orderBookL2"),
            Some(EventKind::Depth)
        );
        assert_eq!(
            FrameArrayProtocol::table_kind("tradeBin1m"),
            Some(EventKind::Kline)
        );
        assert_eq!(
            FrameArrayProtocol::table_kind("instrument"),
            Some(EventKind::Ticker)
        );
        assert_eq!(FrameArrayProtocol::table_kind("announcement"), None);
    }

    #[test]
    fn test_frame_array_decodes_pong_and_success() {
        let protocol = FrameArrayProtocol::new(0, "md");
        assert_eq!(protocol.decode("pong").unwrap(), DecodedFrame::Pong);

        let ack = protocol
            .decode(r#"[0,0,"md",{"success":true,"id":9}]"#)
            .unwrap();
        assert!(matches!(ack, DecodedFrame::Ack { id: Some(9), .. }));
    }

    #[test]
    fn test_frame_array_handshake_identifies_then_subscribes() {
        let protocol = FrameArrayProtocol::new(2, "md");
        let handshake = protocol.handshake(1, &[Topic::new("trade:XBTUSD")]);
        assert_eq!(handshake.await_ack, None);
        assert_eq!(handshake.frames.len(), 2);

        let OutboundFrame::Text(identify) = &handshake.frames[0] else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(identify).unwrap();
        assert_eq!(value[0], OP_SUBSCRIBE);
        assert_eq!(value[1], 2);
    }

    #[test]
    fn test_frame_array_rejects_garbage() {
        let protocol = FrameArrayProtocol::new(0, "md");
        assert!(protocol.decode(r#"{"not":"an array"}"#).is_err());
        assert!(protocol.decode(r#"[9,0,"md",{}]"#).is_err());
    }
}
