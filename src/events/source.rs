//! Named event sources.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::events::payload::Reflect;
use crate::events::subscription::{Gate, Subscription};

/// Receives events from the sources it is subscribed to.
pub trait EventObserver: Send + Sync {
    fn on_next(&self, event: &str, payload: Option<&dyn Reflect>);
}

/// Per-subscription predicate deciding which events are worth producing.
///
/// Arguments are the event name and up to two optional context objects the
/// producer may supply to narrow the decision.
pub type EnabledFilter =
    Arc<dyn Fn(&str, Option<&dyn Reflect>, Option<&dyn Reflect>) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    observer: Arc<dyn EventObserver>,
    filter: Option<EnabledFilter>,
    gate: Gate,
}

impl Subscriber {
    fn is_enabled(&self, event: &str, a: Option<&dyn Reflect>, b: Option<&dyn Reflect>) -> bool {
        self.gate.is_open() && self.filter.as_ref().map_or(true, |filter| filter(event, a, b))
    }

    fn deliver(&self, event: &str, payload: Option<&dyn Reflect>) {
        if let Some(filter) = &self.filter {
            if !filter(event, None, None) {
                return;
            }
        }
        self.gate.pass(|| self.observer.on_next(event, payload));
    }
}

/// A named producer of events.
///
/// Created through [`SourceRegistry::create_source`](crate::events::SourceRegistry::create_source)
/// so that interested parties discover it. Writing is lock-free: the
/// subscriber list is swapped wholesale on (un)subscribe.
pub struct EventSource {
    name: String,
    subscribers: ArcSwap<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl EventSource {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe `observer` to every event written to this source, optionally
    /// narrowed by `filter`.
    pub fn subscribe(
        self: &Arc<Self>,
        observer: Arc<dyn EventObserver>,
        filter: Option<EnabledFilter>,
    ) -> Subscription {
        let subscriber = Arc::new(Subscriber {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            observer,
            filter,
            gate: Gate::new(),
        });

        self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(subscriber.clone());
            next
        });

        tracing::trace!(source = %self.name, subscriber = subscriber.id, "Subscribed to event source");

        let source = Arc::downgrade(self);
        Subscription::new(move || {
            subscriber.gate.close();
            if let Some(source) = source.upgrade() {
                source.remove(subscriber.id);
            }
        })
    }

    fn remove(&self, id: u64) {
        self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|s| s.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        tracing::trace!(source = %self.name, subscriber = id, "Unsubscribed from event source");
    }

    /// Whether any subscriber wants `event`. Producers check this before
    /// building expensive payloads.
    pub fn is_enabled(&self, event: &str) -> bool {
        self.is_enabled_with(event, None, None)
    }

    pub fn is_enabled_with(
        &self,
        event: &str,
        a: Option<&dyn Reflect>,
        b: Option<&dyn Reflect>,
    ) -> bool {
        self.subscribers
            .load()
            .iter()
            .any(|s| s.is_enabled(event, a, b))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    /// Deliver `event` to every subscriber on the calling thread.
    pub fn write(&self, event: &str, payload: Option<&dyn Reflect>) {
        let subscribers = self.subscribers.load_full();
        for subscriber in subscribers.iter() {
            subscriber.deliver(event, payload);
        }
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
