use hermes_ports::{Clock, Connector};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{BackoffPolicy, ProtocolAdapter};

use super::config::GatewayConfig;
use super::handle::{GatewayHandle, GatewayNotice, GatewayShared};
use super::session::GatewaySession;

/// Owns a gateway connection across its whole lifetime.
///
/// Runs one session at a time: a fresh session per connection attempt,
/// reconnecting with backoff while closures stay resumable, stopping on the
/// first fatal one. Subscriptions registered through the handle survive
/// every reconnect; each new session replays them in its handshake.
pub struct ConnectionSupervisor {
    config: Arc<GatewayConfig>,
    connector: Arc<dyn Connector>,
    adapter: Arc<dyn ProtocolAdapter>,
    clock: Arc<dyn Clock>,
    shared: Arc<GatewayShared>,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        adapter: Arc<dyn ProtocolAdapter>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<GatewayNotice>) {
        let config = Arc::new(config);
        let (shared, notices) = GatewayShared::new(&config, clock.clone());
        (
            ConnectionSupervisor {
                config,
                connector,
                adapter,
                clock,
                shared,
                cancel: CancellationToken::new(),
            },
            notices,
        )
    }

    /// API surface for subscribers. Valid before, during, and between
    /// sessions.
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle::new(self.shared.clone())
    }

    /// Spawn the reconnect loop onto the runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.run().await })
    }

    /// Request a graceful close of the current session and prevent further
    /// reconnects. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("gateway stop requested");
            self.cancel.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run sessions until stopped or fatally closed.
    pub async fn run(&self) {
        let mut backoff = BackoffPolicy::new(self.config.backoff.clone());
        let stability = chrono::Duration::from_std(self.config.stability_window)
            .unwrap_or_else(|_| chrono::Duration::MAX);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let session = GatewaySession::new(
                self.config.clone(),
                self.connector.clone(),
                self.adapter.clone(),
                self.clock.clone(),
                self.shared.clone(),
                self.cancel.child_token(),
            );
            let outcome = session.run().await;

            if self.cancel.is_cancelled() {
                self.shared
                    .notify(GatewayNotice::Disconnected(outcome.reason));
                break;
            }

            if !outcome.reason.resumable {
                warn!(reason = %outcome.reason, "gateway closed fatally, not reconnecting");
                self.shared.notify(GatewayNotice::Fatal(outcome.reason));
                break;
            }

            // A connection that proved stable restarts the backoff schedule.
            if let Some(open_for) = outcome.open_for
                && open_for >= stability
            {
                backoff.reset();
            }

            self.shared
                .notify(GatewayNotice::Disconnected(outcome.reason.clone()));

            let delay = backoff.next_delay();
            info!(
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                reason = %outcome.reason,
                "reconnecting after close"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::EnvelopeProtocol;
    use hermes_clock::SystemClock;
    use hermes_ports::{Connection, TransportError};

    struct RefusingConnector;

    #[async_trait::async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
            Err(TransportError::ConnectFailed("refused".into()))
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (supervisor, _notices) = ConnectionSupervisor::new(
            GatewayConfig::for_url("wss://example.invalid/stream"),
            Arc::new(RefusingConnector),
            Arc::new(EnvelopeProtocol::new()),
            Arc::new(SystemClock::new()),
        );
        assert!(!supervisor.is_stopped());
        supervisor.stop();
        supervisor.stop();
        assert!(supervisor.is_stopped());
    }
}
