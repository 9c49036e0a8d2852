use chrono::Duration as ChronoDuration;
use hermes_core::{CloseReason, Timestamp};
use hermes_ports::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::session::GatewaySender;

#[derive(Debug, Default)]
struct HeartbeatState {
    last_sent: Option<Timestamp>,
    last_ack: Option<Timestamp>,
    last_recv: Option<Timestamp>,
    latency: Option<ChronoDuration>,
}

/// Shared liveness state between the receive loop and the monitor task.
///
/// This is the only mutable state crossing the two concurrency domains, so
/// every access goes through the internal lock. The receive loop calls
/// `tick` on every inbound frame; the monitor reads `is_stale` and records
/// probe sends; acks can arrive from either side of the decode.
pub struct Heartbeat {
    interval: Duration,
    timeout: ChronoDuration,
    warn_threshold: ChronoDuration,
    clock: Arc<dyn Clock>,
    state: Mutex<HeartbeatState>,
}

impl Heartbeat {
    pub fn new(
        interval: Duration,
        timeout: Duration,
        warn_threshold: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Heartbeat {
            interval,
            timeout: ChronoDuration::from_std(timeout)
                .unwrap_or_else(|_| ChronoDuration::MAX),
            warn_threshold: ChronoDuration::from_std(warn_threshold)
                .unwrap_or_else(|_| ChronoDuration::MAX),
            clock,
            state: Mutex::new(HeartbeatState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a fresh liveness window. Called once per connection attempt.
    pub fn reset(&self) {
        let now = self.clock.now();
        *self.state.lock() = HeartbeatState {
            last_recv: Some(now),
            ..HeartbeatState::default()
        };
    }

    /// Any inbound frame counts as proof of life, ack or not.
    pub fn tick(&self) {
        self.state.lock().last_recv = Some(self.clock.now());
    }

    /// A probe left through the send path.
    pub fn record_sent(&self) {
        self.state.lock().last_sent = Some(self.clock.now());
    }

    /// The peer answered our probe; update the latency estimate.
    pub fn ack(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.last_ack = Some(now);
        if let Some(sent) = state.last_sent {
            let latency = now - sent;
            state.latency = Some(latency);
            if latency > self.warn_threshold {
                warn!(
                    latency_ms = latency.num_milliseconds(),
                    "can't keep up, gateway is falling behind"
                );
            }
        }
    }

    /// Latest probe round-trip estimate.
    pub fn latency(&self) -> Option<Duration> {
        self.state
            .lock()
            .latency
            .and_then(|l| l.to_std().ok())
    }

    /// True once inbound silence has exceeded the timeout.
    pub fn is_stale(&self) -> bool {
        let state = self.state.lock();
        match state.last_recv {
            Some(last) => self.clock.now() - last > self.timeout,
            None => false,
        }
    }
}

/// Background liveness monitor.
///
/// Runs independently of the receive loop from the moment the session opens
/// until closure. Each tick either declares the peer unresponsive (one
/// force-close request, then exit) or sends a probe through the same
/// rate-limited path as every other outbound frame.
pub async fn run_monitor(
    heartbeat: Arc<Heartbeat>,
    sender: GatewaySender,
    close_tx: mpsc::Sender<CloseReason>,
    cancel: CancellationToken,
) {
    let interval = heartbeat.interval();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        if heartbeat.is_stale() {
            warn!("peer stopped responding to the gateway, closing and restarting");
            let _ = close_tx.send(CloseReason::stalled()).await;
            return;
        }

        if let Err(e) = sender.send_heartbeat().await {
            debug!(error = %e, "heartbeat send failed, monitor exiting");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_clock::ManualClock;

    fn heartbeat() -> (Heartbeat, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        let hb = Heartbeat::new(
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_secs(10),
            clock.clone(),
        );
        hb.reset();
        (hb, clock)
    }

    #[test]
    fn test_fresh_connection_is_not_stale() {
        let (hb, _clock) = heartbeat();
        assert!(!hb.is_stale());
    }

    #[test]
    fn test_silence_past_timeout_is_stale() {
        let (hb, clock) = heartbeat();
        clock.advance(ChronoDuration::seconds(31));
        assert!(hb.is_stale());
    }

    #[test]
    fn test_any_inbound_frame_restarts_the_window() {
        let (hb, clock) = heartbeat();
        clock.advance(ChronoDuration::seconds(29));
        hb.tick();
        clock.advance(ChronoDuration::seconds(29));
        assert!(!hb.is_stale());
        clock.advance(ChronoDuration::seconds(2));
        assert!(hb.is_stale());
    }

    #[test]
    fn test_ack_measures_probe_round_trip() {
        let (hb, clock) = heartbeat();
        hb.record_sent();
        clock.advance(ChronoDuration::milliseconds(120));
        hb.ack();
        assert_eq!(hb.latency(), Some(Duration::from_millis(120)));
    }

    #[test]
    fn test_ack_without_probe_reports_no_latency() {
        let (hb, _clock) = heartbeat();
        hb.ack();
        assert_eq!(hb.latency(), None);
    }
}
