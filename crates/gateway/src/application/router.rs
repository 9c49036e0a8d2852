use dashmap::DashMap;
use hermes_core::{EventKind, HandlerId, Topic};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{DecodeError, DecodedFrame, EventCallback, ProtocolAdapter};

use super::waiters::EventWaiterRegistry;

#[derive(Error, Debug)]
pub enum SubscribeError {
    /// The topic's channel does not map onto a known event kind.
    #[error("topic does not map to a known event kind: {0}")]
    UnknownTopic(String),
}

struct SubscriptionEntry {
    id: HandlerId,
    topic: Topic,
    callback: EventCallback,
}

/// Long-lived subscriber handlers, keyed by canonical event kind.
///
/// Topics are validated against the closed [`EventKind`] set at
/// registration; several handlers may share a topic, and several topics may
/// feed the same kind. The registry outlives individual sessions - the
/// supervisor replays its topics into each new handshake.
pub struct SubscriptionRegistry {
    handlers: DashMap<EventKind, Vec<SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry {
            handlers: DashMap::new(),
        }
    }

    pub fn subscribe(
        &self,
        topic: Topic,
        callback: EventCallback,
    ) -> Result<HandlerId, SubscribeError> {
        let kind = topic
            .kind()
            .ok_or_else(|| SubscribeError::UnknownTopic(topic.as_str().to_string()))?;
        let id = HandlerId::new();
        self.handlers.entry(kind).or_default().push(SubscriptionEntry {
            id,
            topic,
            callback,
        });
        Ok(id)
    }

    /// Remove every handler registered for `topic`. Returns how many went.
    pub fn unsubscribe_topic(&self, topic: &Topic) -> usize {
        let mut removed = 0;
        for mut entry in self.handlers.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|sub| &sub.topic != topic);
            removed += before - entry.value().len();
        }
        removed
    }

    /// Remove one handler by id. Returns whether it was found.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        for mut entry in self.handlers.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|sub| sub.id != id);
            if entry.value().len() != before {
                return true;
            }
        }
        false
    }

    /// Distinct topics currently subscribed, for handshake replay.
    pub fn topics(&self) -> Vec<Topic> {
        let mut seen = HashSet::new();
        let mut topics = Vec::new();
        for entry in self.handlers.iter() {
            for sub in entry.value() {
                if seen.insert(sub.topic.clone()) {
                    topics.push(sub.topic.clone());
                }
            }
        }
        topics
    }

    /// Invoke every handler registered for `kind`. Returns the number of
    /// handlers called. Callbacks run outside the map guard so they may
    /// subscribe or unsubscribe reentrantly.
    pub fn dispatch(&self, kind: EventKind, payload: &Value) -> usize {
        let callbacks: Vec<EventCallback> = self
            .handlers
            .get(&kind)
            .map(|entry| entry.iter().map(|sub| sub.callback.clone()).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies decoded inbound frames and fans them out.
///
/// One decode feeds both consumption models: long-lived subscribers first,
/// then one-shot waiters, always in that order. Events nobody handles are
/// logged at debug and dropped - an unknown event is never fatal.
pub struct MessageRouter {
    adapter: Arc<dyn ProtocolAdapter>,
    subscriptions: Arc<SubscriptionRegistry>,
    waiters: Arc<EventWaiterRegistry>,
}

impl MessageRouter {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        subscriptions: Arc<SubscriptionRegistry>,
        waiters: Arc<EventWaiterRegistry>,
    ) -> Self {
        MessageRouter {
            adapter,
            subscriptions,
            waiters,
        }
    }

    /// Decode one raw frame and dispatch it. The decoded frame is returned
    /// so the session can react to control frames (acks, pongs).
    pub fn route(&self, raw: &str) -> Result<DecodedFrame, DecodeError> {
        let frame = self.adapter.decode(raw)?;
        match &frame {
            DecodedFrame::Event { kind, payload } => {
                let handled = self.subscriptions.dispatch(*kind, payload);
                if handled == 0 {
                    debug!(kind = %kind, "no handler for event");
                }
                self.waiters.dispatch(*kind, payload);
            }
            DecodedFrame::Ack { id, result } => {
                debug!(id = ?id, "request acknowledged");
                let payload = json!({ "id": id, "result": result });
                self.waiters.dispatch(EventKind::Ack, &payload);
            }
            DecodedFrame::ApiError { id, code, msg } => {
                warn!(id = ?id, code, msg = %msg, "error response from peer");
                let payload = json!({ "id": id, "code": code, "msg": msg });
                self.waiters.dispatch(EventKind::Ack, &payload);
            }
            DecodedFrame::Pong => {}
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::Topic;
    use hermes_ports::OutboundFrame;
    use parking_lot::Mutex;
    use crate::domain::Handshake;

    /// Minimal adapter: `kind|json` on the wire.
    struct PipeAdapter;

    impl ProtocolAdapter for PipeAdapter {
        fn name(&self) -> &'static str {
            "pipe"
        }

        fn decode(&self, raw: &str) -> Result<DecodedFrame, DecodeError> {
            let (kind, body) = raw
                .split_once('|')
                .ok_or_else(|| DecodeError::Malformed(raw.to_string()))?;
            let kind = EventKind::from_channel(kind)
                .ok_or_else(|| DecodeError::UnknownStream(kind.to_string()))?;
            Ok(DecodedFrame::Event {
                kind,
                payload: serde_json::from_str(body)?,
            })
        }

        fn handshake(&self, _id: u64, _topics: &[Topic]) -> Handshake {
            Handshake::immediate(Vec::new())
        }

        fn subscribe_frame(&self, _id: u64, _topics: &[Topic]) -> OutboundFrame {
            OutboundFrame::Text(String::new())
        }

        fn unsubscribe_frame(&self, _id: u64, _topics: &[Topic]) -> OutboundFrame {
            OutboundFrame::Text(String::new())
        }

        fn heartbeat_frame(&self) -> OutboundFrame {
            OutboundFrame::Ping(Vec::new())
        }
    }

    fn router() -> (MessageRouter, Arc<SubscriptionRegistry>, Arc<EventWaiterRegistry>) {
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let waiters = Arc::new(EventWaiterRegistry::new());
        let router = MessageRouter::new(
            Arc::new(PipeAdapter),
            subscriptions.clone(),
            waiters.clone(),
        );
        (router, subscriptions, waiters)
    }

    #[test]
    fn test_one_decode_feeds_handlers_and_waiters() {
        let (router, subscriptions, waiters) = router();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        subscriptions
            .subscribe(
                Topic::new("btcusdt@ticker"),
                Arc::new(move |payload| sink.lock().push(payload.clone())),
            )
            .unwrap();
        let handle = waiters.register(EventKind::Ticker, Box::new(|_| Ok(true)), None);

        router.route(r#"ticker|{"price":"9"}"#).unwrap();

        assert_eq!(seen.lock().len(), 1);
        assert!(waiters.is_empty());
        drop(handle);
    }

    #[test]
    fn test_unhandled_event_is_not_an_error() {
        let (router, _subscriptions, _waiters) = router();
        let frame = router.route(r#"trade|{"id":1}"#).unwrap();
        assert!(matches!(frame, DecodedFrame::Event { kind: EventKind::Trade, .. }));
    }

    #[test]
    fn test_malformed_frame_surfaces_as_decode_error() {
        let (router, _subscriptions, _waiters) = router();
        assert!(router.route("not a frame").is_err());
    }

    #[test]
    fn test_subscription_validation_rejects_unknown_channels() {
        let registry = SubscriptionRegistry::new();
        let result = registry.subscribe(Topic::new("btcusdt@funding"), Arc::new(|_| {}));
        assert!(matches!(result, Err(SubscribeError::UnknownTopic(_))));
    }

    #[test]
    fn test_unsubscribe_by_topic_and_by_id() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::new("btcusdt@trade");
        let id = registry.subscribe(topic.clone(), Arc::new(|_| {})).unwrap();
        registry.subscribe(topic.clone(), Arc::new(|_| {})).unwrap();
        assert_eq!(registry.handler_count(), 2);

        assert!(registry.unsubscribe(id));
        assert_eq!(registry.handler_count(), 1);
        assert_eq!(registry.unsubscribe_topic(&topic), 1);
        assert_eq!(registry.handler_count(), 0);
    }

    #[test]
    fn test_topics_deduplicates_for_replay() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::new("ethusdt@depth");
        registry.subscribe(topic.clone(), Arc::new(|_| {})).unwrap();
        registry.subscribe(topic.clone(), Arc::new(|_| {})).unwrap();
        registry
            .subscribe(Topic::new("ethusdt@trade"), Arc::new(|_| {}))
            .unwrap();

        assert_eq!(registry.topics().len(), 2);
    }
}
