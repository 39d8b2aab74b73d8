//! Named-event dispatcher for Courier.
//!
//! Both SDK halves publish through this primitive: the client re-publishes
//! semantic events to application code, the server routes inbound frames to
//! protocol handlers. Handlers for one event run in registration order, and
//! a failing handler never prevents its siblings from running.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

/// Error returned by an event handler.
///
/// Handler failures are logged at the dispatch boundary and isolated per
/// handler; they are never propagated to the publisher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a new handler error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Token identifying one subscription; passing it back removes exactly that
/// handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous event handler stored by [`Dispatcher::publish`]-style buses.
pub type SyncHandler<E> = Arc<dyn Fn(&E) -> Result<(), HandlerError> + Send + Sync>;

struct Buckets<K, H> {
    next_id: u64,
    buckets: HashMap<K, Vec<(SubscriptionId, H)>>,
}

/// A named-event publish/subscribe table.
///
/// Keys are event kinds (a tagged enum discriminant, not a free-form
/// string), handlers are any cloneable callback type. Publishing wrappers
/// take an ordered snapshot via [`Dispatcher::snapshot`] so handlers can
/// subscribe or unsubscribe without holding the table lock during dispatch.
pub struct Dispatcher<K, H> {
    inner: Mutex<Buckets<K, H>>,
}

impl<K, H> Dispatcher<K, H>
where
    K: Eq + Hash + Clone,
    H: Clone,
{
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Buckets {
                next_id: 0,
                buckets: HashMap::new(),
            }),
        }
    }

    /// Register a handler for an event kind.
    ///
    /// Handlers for the same kind are invoked in registration order.
    pub fn subscribe(&self, kind: K, handler: H) -> SubscriptionId {
        let mut inner = self.inner.lock().expect("dispatcher lock poisoned");
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.buckets.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove exactly the handler identified by `id`.
    ///
    /// Returns `true` if the handler was present. An event kind whose last
    /// handler is removed drops its bucket entirely.
    pub fn unsubscribe(&self, kind: &K, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().expect("dispatcher lock poisoned");
        let Some(handlers) = inner.buckets.get_mut(kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        let removed = handlers.len() < before;
        if handlers.is_empty() {
            inner.buckets.remove(kind);
        }
        removed
    }

    /// Remove all handlers for one event kind, or every handler when `kind`
    /// is `None`.
    pub fn unsubscribe_all(&self, kind: Option<&K>) {
        let mut inner = self.inner.lock().expect("dispatcher lock poisoned");
        match kind {
            Some(kind) => {
                inner.buckets.remove(kind);
            }
            None => inner.buckets.clear(),
        }
    }

    /// Ordered snapshot of the handlers registered for an event kind.
    ///
    /// Empty when nobody subscribed; publishing to such a kind is a no-op.
    #[must_use]
    pub fn snapshot(&self, kind: &K) -> Vec<H> {
        let inner = self.inner.lock().expect("dispatcher lock poisoned");
        inner
            .buckets
            .get(kind)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of handlers registered for an event kind.
    #[must_use]
    pub fn subscriber_count(&self, kind: &K) -> usize {
        let inner = self.inner.lock().expect("dispatcher lock poisoned");
        inner.buckets.get(kind).map_or(0, Vec::len)
    }
}

impl<K, E> Dispatcher<K, SyncHandler<E>>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Publish an event to every handler registered for `kind`.
    ///
    /// Handlers run in registration order; a handler error is logged and the
    /// remaining handlers still run. Publishing with no subscribers is a
    /// no-op, never an error.
    pub fn publish(&self, kind: &K, event: &E) {
        for handler in self.snapshot(kind) {
            if let Err(e) = handler(event) {
                warn!(kind = ?kind, error = %e, "Event handler failed");
            }
        }
    }
}

impl<K, H> Default for Dispatcher<K, H>
where
    K: Eq + Hash + Clone,
    H: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestBus = Dispatcher<&'static str, SyncHandler<u32>>;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = TestBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(
                "ev",
                Arc::new(move |_: &u32| {
                    log.lock().unwrap().push(tag);
                    Ok(())
                }),
            );
        }

        bus.publish(&"ev", &1);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_handler_does_not_stop_siblings() {
        let bus = TestBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe("ev", Arc::new(|_: &u32| Err(HandlerError::from("boom"))));
        let calls2 = Arc::clone(&calls);
        bus.subscribe(
            "ev",
            Arc::new(move |_: &u32| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        bus.publish(&"ev", &1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one_handler() {
        let bus = TestBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let id = bus.subscribe(
            "ev",
            Arc::new(move |_: &u32| {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let c2 = Arc::clone(&calls);
        bus.subscribe(
            "ev",
            Arc::new(move |_: &u32| {
                c2.fetch_add(10, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert!(bus.unsubscribe(&"ev", id));
        assert!(!bus.unsubscribe(&"ev", id));

        bus.publish(&"ev", &1);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_last_unsubscribe_drops_bucket() {
        let bus = TestBus::new();
        let id = bus.subscribe("ev", Arc::new(|_: &u32| Ok(())));
        assert_eq!(bus.subscriber_count(&"ev"), 1);

        bus.unsubscribe(&"ev", id);
        assert_eq!(bus.subscriber_count(&"ev"), 0);
        // Publishing to the dropped bucket stays a silent no-op.
        bus.publish(&"ev", &1);
    }

    #[test]
    fn test_unsubscribe_all() {
        let bus = TestBus::new();
        bus.subscribe("a", Arc::new(|_: &u32| Ok(())));
        bus.subscribe("a", Arc::new(|_: &u32| Ok(())));
        bus.subscribe("b", Arc::new(|_: &u32| Ok(())));

        bus.unsubscribe_all(Some(&"a"));
        assert_eq!(bus.subscriber_count(&"a"), 0);
        assert_eq!(bus.subscriber_count(&"b"), 1);

        bus.unsubscribe_all(None);
        assert_eq!(bus.subscriber_count(&"b"), 0);
    }
}
