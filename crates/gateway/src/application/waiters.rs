use hermes_core::EventKind;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

/// Failure local to one waiter. Never affects the session or other waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaiterError {
    #[error("predicate failed: {0}")]
    Predicate(String),
    #[error("connection closed before a matching event arrived")]
    ConnectionClosed,
}

/// Decides whether a payload is the event the caller is waiting for.
/// Errors complete the waiter's future with the error.
pub type WaiterPredicate = Box<dyn Fn(&Value) -> Result<bool, WaiterError> + Send + Sync>;

/// Optional projection applied to the matched payload before completion.
pub type WaiterTransform = Box<dyn Fn(&Value) -> Value + Send + Sync>;

struct Waiter {
    kind: EventKind,
    predicate: WaiterPredicate,
    transform: Option<WaiterTransform>,
    // Consumed on completion; the oneshot guarantees single assignment.
    tx: Option<oneshot::Sender<Result<Value, WaiterError>>>,
}

impl Waiter {
    fn complete(&mut self, result: Result<Value, WaiterError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }

    fn is_abandoned(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// Caller-side handle to a registered waiter.
///
/// Await `wait` for the matched (and transformed) payload. Dropping the
/// handle cancels the waiter; it will be pruned on the next dispatch.
pub struct WaiterHandle {
    rx: oneshot::Receiver<Result<Value, WaiterError>>,
}

impl WaiterHandle {
    pub async fn wait(self) -> Result<Value, WaiterError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(WaiterError::ConnectionClosed),
        }
    }
}

/// One-shot futures correlated to inbound events by predicate.
pub struct EventWaiterRegistry {
    waiters: Mutex<Vec<Waiter>>,
}

impl EventWaiterRegistry {
    pub fn new() -> Self {
        EventWaiterRegistry {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Register a waiter. Returns immediately; the handle resolves when a
    /// matching event of `kind` is dispatched.
    pub fn register(
        &self,
        kind: EventKind,
        predicate: WaiterPredicate,
        transform: Option<WaiterTransform>,
    ) -> WaiterHandle {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(Waiter {
            kind,
            predicate,
            transform,
            tx: Some(tx),
        });
        WaiterHandle { rx }
    }

    /// Offer an event to every pending waiter of `kind`.
    ///
    /// Waiters are taken out of the registry, evaluated in one pass, and the
    /// survivors put back - completion and removal never mutate the
    /// collection mid-iteration, and waiters registered from inside a
    /// completion land behind the survivors.
    pub fn dispatch(&self, kind: EventKind, payload: &Value) {
        let mut pending = std::mem::take(&mut *self.waiters.lock());

        pending.retain_mut(|waiter| {
            if waiter.is_abandoned() {
                return false;
            }
            if waiter.kind != kind {
                return true;
            }
            match (waiter.predicate)(payload) {
                Err(e) => {
                    waiter.complete(Err(e));
                    false
                }
                Ok(false) => true,
                Ok(true) => {
                    let result = match &waiter.transform {
                        Some(transform) => transform(payload),
                        None => payload.clone(),
                    };
                    waiter.complete(Ok(result));
                    false
                }
            }
        });

        let mut waiters = self.waiters.lock();
        let registered_during_dispatch = std::mem::replace(&mut *waiters, pending);
        waiters.extend(registered_during_dispatch);
    }

    /// Complete every pending waiter with `error` and empty the registry.
    /// Called when the session terminates so callers never hang across a
    /// connection epoch.
    pub fn fail_all(&self, error: WaiterError) {
        let pending = std::mem::take(&mut *self.waiters.lock());
        for mut waiter in pending {
            waiter.complete(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

impl Default for EventWaiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn always(value: bool) -> WaiterPredicate {
        Box::new(move |_| Ok(value))
    }

    #[tokio::test]
    async fn test_matching_waiter_completes_once_and_is_removed() {
        let registry = EventWaiterRegistry::new();
        let handle = registry.register(EventKind::Ticker, always(true), None);

        registry.dispatch(EventKind::Ticker, &json!({"price": "100"}));
        assert!(registry.is_empty());

        let payload = handle.wait().await.unwrap();
        assert_eq!(payload["price"], "100");

        // A second matching dispatch has nothing left to trigger.
        registry.dispatch(EventKind::Ticker, &json!({"price": "101"}));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_non_matching_waiters_stay_registered() {
        let registry = EventWaiterRegistry::new();
        let handle = registry.register(
            EventKind::Trade,
            Box::new(|payload| Ok(payload["id"] == 7)),
            None,
        );

        registry.dispatch(EventKind::Trade, &json!({"id": 3}));
        assert_eq!(registry.len(), 1);

        registry.dispatch(EventKind::Trade, &json!({"id": 7}));
        assert!(registry.is_empty());
        assert_eq!(handle.wait().await.unwrap()["id"], 7);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_not_offered() {
        let registry = EventWaiterRegistry::new();
        let _handle = registry.register(EventKind::Depth, always(true), None);

        registry.dispatch(EventKind::Ticker, &json!({}));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_predicate_error_completes_that_waiter_only() {
        let registry = EventWaiterRegistry::new();
        let failing = registry.register(
            EventKind::Ticker,
            Box::new(|_| Err(WaiterError::Predicate("missing field".into()))),
            None,
        );
        let healthy = registry.register(
            EventKind::Ticker,
            Box::new(|payload| Ok(payload["seq"] == 2)),
            None,
        );

        registry.dispatch(EventKind::Ticker, &json!({"seq": 1}));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            failing.wait().await,
            Err(WaiterError::Predicate("missing field".into()))
        );

        registry.dispatch(EventKind::Ticker, &json!({"seq": 2}));
        assert_eq!(healthy.wait().await.unwrap()["seq"], 2);
    }

    #[tokio::test]
    async fn test_transform_projects_the_payload() {
        let registry = EventWaiterRegistry::new();
        let handle = registry.register(
            EventKind::Ticker,
            always(true),
            Some(Box::new(|payload| payload["price"].clone())),
        );

        registry.dispatch(EventKind::Ticker, &json!({"price": "42.5"}));
        assert_eq!(handle.wait().await.unwrap(), json!("42.5"));
    }

    #[tokio::test]
    async fn test_abandoned_waiters_are_pruned() {
        let registry = EventWaiterRegistry::new();
        let handle = registry.register(EventKind::Ticker, always(false), None);
        drop(handle);
        assert_eq!(registry.len(), 1);

        registry.dispatch(EventKind::Trade, &json!({}));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_pending_waiter() {
        let registry = EventWaiterRegistry::new();
        let first = registry.register(EventKind::Ticker, always(false), None);
        let second = registry.register(EventKind::Ack, always(false), None);

        registry.fail_all(WaiterError::ConnectionClosed);
        assert!(registry.is_empty());
        assert_eq!(first.wait().await, Err(WaiterError::ConnectionClosed));
        assert_eq!(second.wait().await, Err(WaiterError::ConnectionClosed));
    }
}
