use hermes_core::{CLOSE_ABNORMAL, CLOSE_NORMAL, CloseReason, Timestamp, Topic};
use hermes_ports::{Clock, Connection, Connector, InboundFrame, OutboundFrame, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{ConnectionState, DecodedFrame, ProtocolAdapter};

use super::config::GatewayConfig;
use super::handle::{GatewayNotice, GatewayShared};
use super::heartbeat::run_monitor;
use super::rate_limiter::RateLimiter;
use super::router::MessageRouter;
use super::waiters::WaiterError;

/// How long a close handshake may dangle before the session gives up on
/// hearing the peer's close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Rate-limited, FIFO-ordered send path of one session.
///
/// Every outbound command funnels through the gate: one critical section
/// covering token accounting and the channel write, so concurrent callers
/// cannot reorder relative to the limiter. Request ids are unique per
/// connection.
#[derive(Clone)]
pub struct GatewaySender {
    adapter: Arc<dyn ProtocolAdapter>,
    limiter: Arc<RateLimiter>,
    heartbeat: Arc<super::heartbeat::Heartbeat>,
    outbound: mpsc::Sender<OutboundFrame>,
    gate: Arc<AsyncMutex<()>>,
    request_id: Arc<AtomicU64>,
}

impl GatewaySender {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        limiter: Arc<RateLimiter>,
        heartbeat: Arc<super::heartbeat::Heartbeat>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        GatewaySender {
            adapter,
            limiter,
            heartbeat,
            outbound,
            gate: Arc::new(AsyncMutex::new(())),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send one frame through the rate-limited gate.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        let _gate = self.gate.lock().await;
        self.limiter.throttle().await;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Subscribe to streams. Returns the request id for ack correlation.
    pub async fn subscribe(&self, topics: &[Topic]) -> Result<u64, TransportError> {
        let id = self.next_id();
        self.send(self.adapter.subscribe_frame(id, topics)).await?;
        Ok(id)
    }

    /// Unsubscribe from streams. Returns the request id for ack correlation.
    pub async fn unsubscribe(&self, topics: &[Topic]) -> Result<u64, TransportError> {
        let id = self.next_id();
        self.send(self.adapter.unsubscribe_frame(id, topics)).await?;
        Ok(id)
    }

    /// Send a liveness probe and record the send time.
    pub async fn send_heartbeat(&self) -> Result<(), TransportError> {
        self.send(self.adapter.heartbeat_frame()).await?;
        self.heartbeat.record_sent();
        Ok(())
    }

    /// Begin the close handshake. Bypasses the rate limiter: a shutdown
    /// must not wait for tokens.
    pub async fn close(&self, code: u16) -> Result<(), TransportError> {
        self.outbound
            .send(OutboundFrame::Close { code })
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_limited()
    }
}

/// How one session run ended.
#[derive(Debug)]
pub struct SessionOutcome {
    pub reason: CloseReason,
    /// How long the session held `Open`, if it got there at all.
    pub open_for: Option<chrono::Duration>,
}

enum Step {
    Route(String),
    Pong,
    Closed(Option<u16>),
    Errored(String),
    Skip,
}

/// One connection epoch: dial, handshake, receive loop, closure.
///
/// The session owns the connection state and is its only mutator. Created
/// per attempt and discarded once `run` returns; the supervisor decides
/// whether a successor gets built.
pub struct GatewaySession {
    config: Arc<GatewayConfig>,
    connector: Arc<dyn Connector>,
    adapter: Arc<dyn ProtocolAdapter>,
    clock: Arc<dyn Clock>,
    shared: Arc<GatewayShared>,
    cancel: CancellationToken,
}

impl GatewaySession {
    pub fn new(
        config: Arc<GatewayConfig>,
        connector: Arc<dyn Connector>,
        adapter: Arc<dyn ProtocolAdapter>,
        clock: Arc<dyn Clock>,
        shared: Arc<GatewayShared>,
        cancel: CancellationToken,
    ) -> Self {
        GatewaySession {
            config,
            connector,
            adapter,
            clock,
            shared,
            cancel,
        }
    }

    /// Drive the session from `Connecting` to `Closed`. Runs the receive
    /// loop to completion; every exit path releases the monitor task,
    /// clears the live sender slot, and resolves pending waiters.
    pub async fn run(self) -> SessionOutcome {
        let monitor_cancel = self.cancel.child_token();

        self.shared.set_state(ConnectionState::Connecting);
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.config.url),
        );
        let connection = tokio::select! {
            _ = self.cancel.cancelled() => {
                return self.finish(None, &monitor_cancel, CloseReason::local_close(), None).await;
            }
            result = connect => match result {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => {
                    return self
                        .finish(
                            None,
                            &monitor_cancel,
                            CloseReason::transport_lost(format!("connect failed: {e}")),
                            None,
                        )
                        .await;
                }
                Err(_) => {
                    return self
                        .finish(
                            None,
                            &monitor_cancel,
                            CloseReason::transport_lost("connect timed out"),
                            None,
                        )
                        .await;
                }
            },
        };
        let Connection {
            outbound,
            mut inbound,
        } = connection;

        let limiter = Arc::new(RateLimiter::new(&self.config.rate_limit, self.clock.clone()));
        let sender = GatewaySender::new(
            self.adapter.clone(),
            limiter,
            self.shared.heartbeat.clone(),
            outbound,
        );
        self.shared.heartbeat.reset();

        // Identify and replay the current subscription set.
        self.shared.set_state(ConnectionState::Handshaking);
        let topics = self.shared.subscriptions.topics();
        let handshake = self.adapter.handshake(sender.next_id(), &topics);
        let mut awaiting_ack = handshake.await_ack;
        for frame in handshake.frames {
            if sender.send(frame).await.is_err() {
                return self
                    .finish(
                        None,
                        &monitor_cancel,
                        CloseReason::transport_lost("connection lost during handshake"),
                        None,
                    )
                    .await;
            }
        }

        let router = MessageRouter::new(
            self.adapter.clone(),
            self.shared.subscriptions.clone(),
            self.shared.waiters.clone(),
        );
        let (close_tx, mut close_rx) = mpsc::channel::<CloseReason>(4);

        let mut monitor: Option<JoinHandle<()>> = None;
        let mut opened_at: Option<Timestamp> = None;
        let mut closing_reason: Option<CloseReason> = None;
        // Bounds the handshake first, later the close handshake.
        let mut phase_deadline = Some(Instant::now() + self.config.heartbeat_timeout);

        if awaiting_ack.is_none() {
            phase_deadline = None;
            self.open_session(&sender, &close_tx, &monitor_cancel, &mut monitor, &mut opened_at);
        }

        let reason = loop {
            tokio::select! {
                _ = self.cancel.cancelled(), if closing_reason.is_none() => {
                    self.shared.set_state(ConnectionState::Closing);
                    let _ = sender.close(CLOSE_NORMAL).await;
                    closing_reason = Some(CloseReason::local_close());
                    phase_deadline = Some(Instant::now() + CLOSE_GRACE);
                }
                Some(reason) = close_rx.recv(), if closing_reason.is_none() => {
                    self.shared.set_state(ConnectionState::Closing);
                    let _ = sender.close(reason.code).await;
                    closing_reason = Some(reason);
                    phase_deadline = Some(Instant::now() + CLOSE_GRACE);
                }
                _ = tokio::time::sleep_until(phase_deadline.unwrap_or_else(Instant::now)),
                    if phase_deadline.is_some() =>
                {
                    match closing_reason.take() {
                        // Peer never finished the close handshake.
                        Some(reason) => break reason,
                        None => break CloseReason::transport_lost("handshake timed out"),
                    }
                }
                maybe_frame = inbound.recv() => {
                    let Some(frame) = maybe_frame else {
                        break closing_reason.take().unwrap_or_else(|| {
                            CloseReason::transport_lost("transport closed unexpectedly")
                        });
                    };
                    let step = match frame {
                        InboundFrame::Text(text) => Step::Route(text),
                        InboundFrame::Binary(bytes) => match String::from_utf8(bytes) {
                            Ok(text) => Step::Route(text),
                            Err(_) => {
                                debug!("skipping non-utf8 binary frame");
                                Step::Skip
                            }
                        },
                        InboundFrame::Pong(_) => Step::Pong,
                        InboundFrame::Closed { code } => Step::Closed(code),
                        InboundFrame::Error(e) => Step::Errored(e),
                    };
                    match step {
                        Step::Route(text) => {
                            self.shared.heartbeat.tick();
                            match router.route(&text) {
                                Err(e) => debug!(error = %e, "skipping undecodable frame"),
                                Ok(DecodedFrame::Pong) => self.shared.heartbeat.ack(),
                                Ok(DecodedFrame::Ack { id, .. }) => {
                                    if awaiting_ack.is_some() && awaiting_ack == id {
                                        awaiting_ack = None;
                                        phase_deadline = None;
                                        self.open_session(
                                            &sender,
                                            &close_tx,
                                            &monitor_cancel,
                                            &mut monitor,
                                            &mut opened_at,
                                        );
                                    }
                                }
                                Ok(_) => {}
                            }
                        }
                        Step::Pong => {
                            self.shared.heartbeat.tick();
                            self.shared.heartbeat.ack();
                        }
                        Step::Closed(code) => {
                            break match closing_reason.take() {
                                Some(reason) => reason,
                                None => CloseReason::from_close_code(
                                    code.unwrap_or(CLOSE_ABNORMAL),
                                    "closed by peer",
                                ),
                            };
                        }
                        Step::Errored(e) => {
                            warn!(error = %e, "transport error");
                            self.shared.notify(GatewayNotice::TransportError(e.clone()));
                            break closing_reason
                                .take()
                                .unwrap_or_else(|| CloseReason::transport_lost(e));
                        }
                        Step::Skip => {}
                    }
                }
            }
        };

        self.finish(monitor, &monitor_cancel, reason, opened_at).await
    }

    fn open_session(
        &self,
        sender: &GatewaySender,
        close_tx: &mpsc::Sender<CloseReason>,
        monitor_cancel: &CancellationToken,
        monitor: &mut Option<JoinHandle<()>>,
        opened_at: &mut Option<Timestamp>,
    ) {
        self.shared.set_state(ConnectionState::Open);
        *opened_at = Some(self.clock.now());
        self.shared.set_sender(Some(sender.clone()));
        *monitor = Some(tokio::spawn(run_monitor(
            self.shared.heartbeat.clone(),
            sender.clone(),
            close_tx.clone(),
            monitor_cancel.clone(),
        )));
        self.shared.notify(GatewayNotice::Open);
        info!(url = %self.config.url, protocol = self.adapter.name(), "gateway open");
    }

    async fn finish(
        &self,
        monitor: Option<JoinHandle<()>>,
        monitor_cancel: &CancellationToken,
        reason: CloseReason,
        opened_at: Option<Timestamp>,
    ) -> SessionOutcome {
        monitor_cancel.cancel();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }
        self.shared.set_sender(None);
        self.shared.waiters.fail_all(WaiterError::ConnectionClosed);
        self.shared.set_state(ConnectionState::Closed);
        info!(reason = %reason, "session closed");

        let open_for = opened_at.map(|at| self.clock.now() - at);
        SessionOutcome { reason, open_for }
    }
}
