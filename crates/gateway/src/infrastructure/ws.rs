use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hermes_ports::{Connection, Connector, InboundFrame, OutboundFrame, TransportError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::connect_async;
use tracing::{debug, trace};

/// WebSocket transport behind the [`Connector`] port.
///
/// Owns the socket: `connect` splits it and spawns two pump tasks bridging
/// the sink/stream halves to the connection's channels. The pumps die when
/// their channel side closes, releasing the socket on every exit path.
pub struct WsConnector {
    outbound_capacity: usize,
    inbound_capacity: usize,
}

impl WsConnector {
    pub fn new() -> Self {
        WsConnector {
            outbound_capacity: 32,
            inbound_capacity: 1024,
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let url = url::Url::parse(url)
            .map_err(|e| TransportError::ConnectFailed(format!("invalid url: {e}")))?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(self.outbound_capacity);
        let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(self.inbound_capacity);

        // Writer pump: outbound channel -> socket
        let write_errors = in_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let message = match frame {
                    OutboundFrame::Text(text) => Message::Text(text.into()),
                    OutboundFrame::Ping(payload) => Message::Ping(payload.into()),
                    OutboundFrame::Close { code } => Message::Close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    })),
                };
                if let Err(e) = write.send(message).await {
                    let _ = write_errors
                        .send(InboundFrame::Error(e.to_string()))
                        .await;
                    break;
                }
            }
        });

        // Reader pump: socket -> inbound channel
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => InboundFrame::Text(text.to_string()),
                    Ok(Message::Binary(bytes)) => InboundFrame::Binary(bytes.to_vec()),
                    Ok(Message::Pong(payload)) => InboundFrame::Pong(payload.to_vec()),
                    Ok(Message::Ping(payload)) => {
                        // tungstenite queues the pong reply itself
                        trace!(len = payload.len(), "ping from peer");
                        continue;
                    }
                    Ok(Message::Close(close)) => {
                        let code = close.map(|c| u16::from(c.code));
                        debug!(code = ?code, "close frame from peer");
                        let _ = in_tx.send(InboundFrame::Closed { code }).await;
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(InboundFrame::Error(e.to_string())).await;
                        break;
                    }
                };
                if in_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
