//! A process-wide, name-keyed publish/subscribe broker.
//!
//! Grounded on the teacher's [`LocalEventBus`] (`r2e-events::local`): the same
//! `Arc<RwLock<HashMap<_, Vec<Handler>>>>` shape, but keyed by event name
//! (`String`) instead of `TypeId`, delivering synchronously from the
//! publisher's viewpoint instead of via `tokio::spawn`, and returning a
//! per-subscription unsubscribe handle rather than leaving handlers
//! permanently registered. No durable queueing: subscribers added after a
//! `publish` call never see it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;

pub type Handler = Arc<dyn Fn(&PublishedEvent) + Send + Sync>;

/// An event as observed by subscribers: the payload plus the envelope the
/// bus stamps on every publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub id: String,
    pub name: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub source: Option<String>,
    /// Override the timestamp (used by tests); defaults to "now" otherwise.
    pub timestamp: Option<String>,
}

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    handlers: RwLock<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

/// The broker. Cheap to clone — internally an `Arc`.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// An unsubscribe callable returned by [`EventBus::subscribe`]. Invoking it
/// more than once is a no-op.
pub struct Subscription {
    bus: Arc<Inner>,
    name: String,
    id: u64,
    done: AtomicBool,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut handlers) = self.bus.handlers.write() {
            if let Some(list) = handlers.get_mut(&self.name) {
                list.retain(|entry| entry.id != self.id);
                if list.is_empty() {
                    handlers.remove(&self.name);
                }
            }
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`, returning a handle that detaches it.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&PublishedEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut handlers = self.inner.handlers.write().expect("event bus lock poisoned");
        handlers.entry(name.clone()).or_default().push(Entry { id, handler: Arc::new(handler) });
        drop(handlers);
        Subscription { bus: Arc::clone(&self.inner), name, id, done: AtomicBool::new(false) }
    }

    /// Deliver `payload` to every handler currently subscribed to `name`.
    ///
    /// Delivery is synchronous: by the time this call returns, every
    /// handler that was registered at call time has run (or panicked — a
    /// panicking handler is caught, logged, and does not stop delivery to
    /// the remaining handlers or propagate to the publisher).
    pub fn publish(&self, name: &str, payload: Value, opts: PublishOptions) -> PublishedEvent {
        let event = PublishedEvent {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            timestamp: opts.timestamp.unwrap_or_else(toolhost_core::types::now_rfc3339),
            source: opts.source,
            payload,
        };

        // Snapshot under the read lock so a handler that subscribes or
        // unsubscribes during delivery doesn't deadlock or see a partial list.
        let snapshot: Vec<Handler> = {
            let handlers = self.inner.handlers.read().expect("event bus lock poisoned");
            handlers
                .get(name)
                .map(|list| list.iter().map(|entry| Arc::clone(&entry.handler)).collect())
                .unwrap_or_default()
        };

        for handler in snapshot {
            let event_ref = &event;
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event_ref)));
            if let Err(panic) = result {
                tracing::error!(event = %name, ?panic, "event handler panicked");
            }
        }

        event
    }

    /// Number of handlers currently subscribed to `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .handlers
            .read()
            .expect("event bus lock poisoned")
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn publish_delivers_to_subscriber() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);
        let _sub = bus.subscribe("judgment:created", move |_event| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("judgment:created", serde_json::json!({"id": "j1"}), PublishOptions::default());
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unrelated_events_are_not_delivered() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);
        let _sub = bus.subscribe("tool_pre", move |_event| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("tool_post", serde_json::json!({}), PublishOptions::default());
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);
        let sub = bus.subscribe("x", move |_| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        sub.unsubscribe();
        bus.publish("x", serde_json::json!(null), PublishOptions::default());
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn late_subscriber_misses_prior_events() {
        let bus = EventBus::new();
        bus.publish("x", serde_json::json!(null), PublishOptions::default());
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);
        let _sub = bus.subscribe("x", move |_| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn a_panicking_handler_does_not_stop_delivery_to_others() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let _sub1 = bus.subscribe("x", |_| panic!("boom"));
        let received_clone = Arc::clone(&received);
        let _sub2 = bus.subscribe("x", move |_| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("x", serde_json::json!(null), PublishOptions::default());
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let subs: Vec<_> = (0..5)
            .map(|_| {
                let count = Arc::clone(&count);
                bus.subscribe("fanout", move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        bus.publish("fanout", serde_json::json!(null), PublishOptions::default());
        assert_eq!(count.load(Ordering::SeqCst), 5);
        drop(subs);
    }

    #[test]
    fn published_event_carries_source_and_payload() {
        let bus = EventBus::new();
        let captured: Arc<std::sync::Mutex<Option<PublishedEvent>>> = Arc::default();
        let captured_clone = Arc::clone(&captured);
        let _sub = bus.subscribe("tagged", move |event| {
            *captured_clone.lock().unwrap() = Some(event.clone());
        });
        bus.publish(
            "tagged",
            serde_json::json!({"k": "v"}),
            PublishOptions { source: Some("dispatcher".into()), timestamp: None },
        );
        let captured = captured.lock().unwrap();
        let event = captured.as_ref().expect("event delivered");
        assert_eq!(event.source.as_deref(), Some("dispatcher"));
        assert_eq!(event.payload["k"], "v");
    }
}
