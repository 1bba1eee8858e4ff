// src/bus/event_bus.rs
//! Topic-based publish/subscribe bus
//!
//! Dispatch is synchronous. Listeners registered on a topic are snapshotted
//! when a publish starts, so a listener may subscribe, unsubscribe or publish
//! from inside its own callback without deadlocking the bus.
//!
//! A listener that returns an error or panics is isolated: the remaining
//! listeners still run. The failure is logged, or, with capture-rejections
//! enabled, re-published once on the reserved [`ERROR_TOPIC`].

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Reserved topic for listener failures
pub const ERROR_TOPIC: &str = "error";

/// Error type listeners may return
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Listener return type
pub type ListenerResult = std::result::Result<(), ListenerError>;

type Listener<E> = Arc<dyn Fn(&E) -> ListenerResult + Send + Sync>;

/// Identifier of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A listener failure, as delivered on the `error` topic
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerFailure {
    /// Topic whose listener failed
    pub topic: String,

    /// Failing listener
    pub listener: ListenerId,

    /// Error message or panic payload
    pub message: String,

    /// Whether the listener panicked rather than returning an error
    pub panicked: bool,
}

/// Bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Listener count per topic above which a warning is logged
    pub max_listeners: usize,

    /// Re-publish listener failures on the `error` topic
    pub capture_rejections: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_listeners: 10,
            capture_rejections: false,
        }
    }
}

impl From<&crate::utils::config::BusConfig> for EventBusConfig {
    fn from(config: &crate::utils::config::BusConfig) -> Self {
        Self {
            max_listeners: config.max_listeners,
            capture_rejections: config.capture_rejections,
        }
    }
}

struct ListenerEntry<E> {
    listener: Listener<E>,
    once: bool,
}

struct BusInner<E> {
    config: EventBusConfig,
    topics: RwLock<HashMap<String, HashMap<ListenerId, ListenerEntry<E>>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    warnings: AtomicU64,
}

impl<E> BusInner<E> {
    fn remove(&self, topic: &str, id: ListenerId) -> bool {
        let mut topics = self.topics.write();
        let Some(listeners) = topics.get_mut(topic) else {
            return false;
        };
        let removed = listeners.remove(&id).is_some();
        if listeners.is_empty() {
            topics.remove(topic);
        }
        removed
    }
}

/// Bus counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Publish calls
    pub published: u64,

    /// Successful listener invocations
    pub delivered: u64,

    /// Listener invocations that errored or panicked
    pub failed: u64,

    /// Max-listener warnings emitted
    pub warnings: u64,
}

/// Typed event bus
///
/// Cloning is cheap and yields a handle to the same bus.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E>
where
    E: From<ListenerFailure> + 'static,
{
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl<E> EventBus<E>
where
    E: From<ListenerFailure> + 'static,
{
    /// Create a new bus
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                topics: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                warnings: AtomicU64::new(0),
            }),
        }
    }

    /// Register a listener for `topic`
    pub fn subscribe<F>(&self, topic: impl Into<String>, listener: F) -> Subscription<E>
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(topic.into(), Arc::new(listener), false)
    }

    /// Register a listener that is removed before its first invocation
    pub fn once<F>(&self, topic: impl Into<String>, listener: F) -> Subscription<E>
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(topic.into(), Arc::new(listener), true)
    }

    fn register(&self, topic: String, listener: Listener<E>, once: bool) -> Subscription<E> {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let count = {
            let mut topics = self.inner.topics.write();
            let listeners = topics.entry(topic.clone()).or_default();
            listeners.insert(id, ListenerEntry { listener, once });
            listeners.len()
        };

        let max = self.inner.config.max_listeners;
        if max > 0 && count == max + 1 {
            self.inner.warnings.fetch_add(1, Ordering::Relaxed);
            warn!(
                topic = %topic,
                count,
                max,
                "Possible listener leak: topic exceeds max listeners"
            );
        }

        debug!(topic = %topic, listener = id.0, once, "Listener subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Deliver `payload` to every listener of `topic`
    ///
    /// Returns `true` if at least one listener was registered.
    pub fn publish(&self, topic: &str, payload: E) -> bool {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("inspector_bus_published_total").increment(1);

        let snapshot: Vec<(ListenerId, Listener<E>)> = {
            let mut topics = self.inner.topics.write();
            let Some(listeners) = topics.get_mut(topic) else {
                return false;
            };

            let snapshot: Vec<_> = listeners
                .iter()
                .map(|(id, entry)| (*id, Arc::clone(&entry.listener)))
                .collect();

            listeners.retain(|_, entry| !entry.once);
            if listeners.is_empty() {
                topics.remove(topic);
            }
            snapshot
        };

        if snapshot.is_empty() {
            return false;
        }

        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(&payload))) {
                Ok(Ok(())) => {
                    self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(err)) => self.handle_failure(topic, id, err.to_string(), false),
                Err(panic_payload) => {
                    self.handle_failure(topic, id, panic_message(panic_payload.as_ref()), true)
                }
            }
        }

        true
    }

    fn handle_failure(&self, topic: &str, listener: ListenerId, message: String, panicked: bool) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("inspector_bus_listener_failures_total").increment(1);

        let failure = ListenerFailure {
            topic: topic.to_string(),
            listener,
            message,
            panicked,
        };

        // Failures inside error listeners are never re-published
        if self.inner.config.capture_rejections && topic != ERROR_TOPIC {
            debug!(topic = %topic, "Re-publishing listener failure on error topic");
            if self.publish(ERROR_TOPIC, E::from(failure.clone())) {
                return;
            }
        }

        error!(
            topic = %failure.topic,
            listener = failure.listener.0,
            panicked = failure.panicked,
            "Listener failed: {}",
            failure.message
        );
    }

    /// Remove one listener from `topic`
    pub fn unsubscribe(&self, topic: &str, id: ListenerId) -> bool {
        self.inner.remove(topic, id)
    }

    /// Remove every listener from `topic`
    pub fn unsubscribe_all(&self, topic: &str) -> usize {
        let removed = self
            .inner
            .topics
            .write()
            .remove(topic)
            .map(|listeners| listeners.len())
            .unwrap_or(0);
        debug!(topic = %topic, removed, "Topic cleared");
        removed
    }

    /// Remove every listener from every topic
    pub fn clear(&self) {
        self.inner.topics.write().clear();
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .read()
            .get(topic)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Topics with at least one listener
    pub fn topics(&self) -> Vec<String> {
        self.inner.topics.read().keys().cloned().collect()
    }

    /// Get bus statistics
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            warnings: self.inner.warnings.load(Ordering::Relaxed),
        }
    }
}

/// Handle returned by `subscribe` and `once`
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<E> {
    bus: Weak<BusInner<E>>,
    topic: String,
    id: ListenerId,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the listener; repeated calls are no-ops
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(&self.topic, self.id),
            None => false,
        }
    }
}

impl<E> std::fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Ping(u32),
        Failure(ListenerFailure),
    }

    impl From<ListenerFailure> for TestEvent {
        fn from(failure: ListenerFailure) -> Self {
            TestEvent::Failure(failure)
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&TestEvent) -> ListenerResult + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &TestEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_publish_without_listeners() {
        let bus: EventBus<TestEvent> = EventBus::default();
        assert!(!bus.publish("network:request", TestEvent::Ping(1)));
    }

    #[test]
    fn test_publish_reaches_all_listeners() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (a, la) = counter();
        let (b, lb) = counter();
        bus.subscribe("t", la);
        bus.subscribe("t", lb);

        assert!(bus.publish("t", TestEvent::Ping(1)));
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().delivered, 2);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (a, la) = counter();
        let (b, lb) = counter();
        bus.subscribe("t", la);
        bus.subscribe("t", |_: &TestEvent| Err("boom".into()));
        bus.subscribe("t", |_: &TestEvent| -> ListenerResult { panic!("kaboom") });
        bus.subscribe("t", lb);

        assert!(bus.publish("t", TestEvent::Ping(1)));
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().failed, 2);
    }

    #[test]
    fn test_max_listeners_warns_but_registers() {
        let bus: EventBus<TestEvent> = EventBus::new(EventBusConfig {
            max_listeners: 2,
            capture_rejections: false,
        });
        let counts: Vec<_> = (0..3)
            .map(|_| {
                let (count, listener) = counter();
                bus.subscribe("t", listener);
                count
            })
            .collect();

        assert_eq!(bus.listener_count("t"), 3);
        assert_eq!(bus.stats().warnings, 1);

        bus.publish("t", TestEvent::Ping(1));
        assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_once() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (count, listener) = counter();
        bus.once("t", listener);

        assert!(bus.publish("t", TestEvent::Ping(1)));
        assert!(!bus.publish("t", TestEvent::Ping(2)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (_, listener) = counter();
        let sub = bus.subscribe("t", listener);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert_eq!(bus.listener_count("t"), 0);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_unsubscribe_after_topic_cleared() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (_, la) = counter();
        let (_, lb) = counter();
        let sub = bus.subscribe("t", la);
        bus.subscribe("t", lb);

        assert_eq!(bus.unsubscribe_all("t"), 2);
        assert!(!sub.unsubscribe());
        assert!(!bus.unsubscribe("t", sub.id()));
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (_, listener) = counter();
        let sub = bus.subscribe("t", listener);
        drop(bus);

        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_topics_and_counts() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let (_, la) = counter();
        let (_, lb) = counter();
        bus.subscribe("a", la);
        bus.subscribe("b", lb);

        let mut topics = bus.topics();
        topics.sort();
        assert_eq!(topics, vec!["a", "b"]);
        assert_eq!(bus.listener_count("a"), 1);
        assert_eq!(bus.listener_count("missing"), 0);
    }

    #[test]
    fn test_capture_rejections_republishes_once() {
        let bus: EventBus<TestEvent> = EventBus::new(EventBusConfig {
            max_listeners: 10,
            capture_rejections: true,
        });

        let failures = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        bus.subscribe(ERROR_TOPIC, move |event: &TestEvent| {
            if let TestEvent::Failure(failure) = event {
                sink.lock().push(failure.clone());
            }
            Err("error listener also fails".into())
        });
        bus.subscribe("t", |_: &TestEvent| Err("boom".into()));

        assert!(bus.publish("t", TestEvent::Ping(1)));

        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].topic, "t");
        assert_eq!(failures[0].message, "boom");
        assert!(!failures[0].panicked);
        // Original failure plus the error listener's own failure
        assert_eq!(bus.stats().failed, 2);
    }

    #[test]
    fn test_reentrant_subscribe_during_publish() {
        let bus: EventBus<TestEvent> = EventBus::default();
        let inner_bus = bus.clone();
        let (late, late_listener) = counter();
        let late_listener = Arc::new(late_listener);

        bus.once("t", move |_: &TestEvent| {
            let l = Arc::clone(&late_listener);
            inner_bus.subscribe("t", move |e: &TestEvent| (*l)(e));
            Ok(())
        });

        bus.publish("t", TestEvent::Ping(1));
        // Registered mid-dispatch: not part of the first snapshot
        assert_eq!(late.load(Ordering::SeqCst), 0);

        bus.publish("t", TestEvent::Ping(2));
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }
}
