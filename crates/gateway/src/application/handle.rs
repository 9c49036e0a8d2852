use arc_swap::ArcSwapOption;
use hermes_core::{CloseReason, EventKind, HandlerId, Topic};
use hermes_ports::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::domain::{ConnectionState, EventCallback};

use super::config::GatewayConfig;
use super::heartbeat::Heartbeat;
use super::router::{SubscribeError, SubscriptionRegistry};
use super::session::GatewaySender;
use super::waiters::{EventWaiterRegistry, WaiterHandle, WaiterPredicate, WaiterTransform};

/// Lifecycle notifications delivered to the owning application.
#[derive(Debug, Clone)]
pub enum GatewayNotice {
    /// A session reached `Open`
    Open,
    /// A session closed; a reconnect attempt follows
    Disconnected(CloseReason),
    /// A session closed with a non-resumable reason; the supervisor stopped
    Fatal(CloseReason),
    /// Transport-level error report (informational; closure follows)
    TransportError(String),
}

/// State shared between the supervisor, the current session, and API
/// handles. Subscriptions and the notice channel outlive any one session;
/// the sender slot points at the live session's send path or nothing.
pub struct GatewayShared {
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub waiters: Arc<EventWaiterRegistry>,
    pub heartbeat: Arc<Heartbeat>,
    current: ArcSwapOption<GatewaySender>,
    notices: mpsc::Sender<GatewayNotice>,
    state_tx: watch::Sender<ConnectionState>,
}

impl GatewayShared {
    pub fn new(
        config: &GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, mpsc::Receiver<GatewayNotice>) {
        let (notices, notice_rx) = mpsc::channel(64);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(GatewayShared {
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            waiters: Arc::new(EventWaiterRegistry::new()),
            heartbeat: Arc::new(Heartbeat::new(
                config.heartbeat_interval,
                config.heartbeat_timeout,
                config.latency_warn_threshold,
                clock,
            )),
            current: ArcSwapOption::empty(),
            notices,
            state_tx,
        });
        (shared, notice_rx)
    }

    /// Best-effort notification; a slow consumer drops notices rather than
    /// stalling the receive loop.
    pub fn notify(&self, notice: GatewayNotice) {
        if let Err(e) = self.notices.try_send(notice) {
            debug!(error = %e, "dropping gateway notice");
        }
    }

    pub fn set_sender(&self, sender: Option<GatewaySender>) {
        self.current.store(sender.map(Arc::new));
    }

    pub fn sender(&self) -> Option<Arc<GatewaySender>> {
        self.current.load_full()
    }

    pub fn set_state(&self, state: ConnectionState) {
        debug!(state = %state, "connection state");
        self.state_tx.send_replace(state);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

/// Cloneable application-facing API surface.
///
/// Valid across reconnects: subscriptions registered here are replayed into
/// every new session's handshake, and commands issued while disconnected
/// are registered locally and sent once a session is live again.
#[derive(Clone)]
pub struct GatewayHandle {
    shared: Arc<GatewayShared>,
}

impl GatewayHandle {
    pub fn new(shared: Arc<GatewayShared>) -> Self {
        GatewayHandle { shared }
    }

    /// Register `callback` for every event delivered on `topic`, and ask
    /// the live connection (if any) to start the stream.
    pub async fn subscribe(
        &self,
        topic: Topic,
        callback: EventCallback,
    ) -> Result<HandlerId, SubscribeError> {
        let id = self.shared.subscriptions.subscribe(topic.clone(), callback)?;
        if let Some(sender) = self.shared.sender()
            && let Err(e) = sender.subscribe(std::slice::from_ref(&topic)).await
        {
            // Registration stands; the topic is replayed on reconnect.
            warn!(topic = %topic, error = %e, "subscribe command not delivered");
        }
        Ok(id)
    }

    /// Drop every handler for `topic` and tell the peer to stop the stream.
    pub async fn unsubscribe(&self, topic: &Topic) -> usize {
        let removed = self.shared.subscriptions.unsubscribe_topic(topic);
        if removed > 0
            && let Some(sender) = self.shared.sender()
            && let Err(e) = sender.unsubscribe(std::slice::from_ref(topic)).await
        {
            warn!(topic = %topic, error = %e, "unsubscribe command not delivered");
        }
        removed
    }

    /// Remove a single handler. The upstream subscription stays until the
    /// last handler for the topic is gone via [`Self::unsubscribe`].
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.shared.subscriptions.unsubscribe(id)
    }

    /// One-shot wait for the next event of `kind` matching `predicate`.
    pub fn wait_for(
        &self,
        kind: EventKind,
        predicate: WaiterPredicate,
        transform: Option<WaiterTransform>,
    ) -> WaiterHandle {
        self.shared.waiters.register(kind, predicate, transform)
    }

    /// Latest heartbeat round-trip estimate for the live connection.
    pub fn latency(&self) -> Option<Duration> {
        self.shared.heartbeat.latency()
    }

    /// Whether the next outbound command would have to wait for the rate
    /// limit window.
    pub fn is_limited(&self) -> bool {
        self.shared
            .sender()
            .map(|sender| sender.is_limited())
            .unwrap_or(false)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_stream()
    }
}
