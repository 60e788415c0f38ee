//! Discovery of event sources.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::events::source::EventSource;
use crate::events::subscription::{Gate, Subscription};

/// Notified whenever an event source becomes available.
pub trait SourceObserver: Send + Sync {
    fn on_source(&self, source: &Arc<EventSource>);
}

struct Watcher {
    id: u64,
    observer: Arc<dyn SourceObserver>,
    gate: Gate,
}

#[derive(Default)]
struct RegistryState {
    sources: Vec<Weak<EventSource>>,
    watchers: Vec<Arc<Watcher>>,
    next_id: u64,
}

/// Registry of the event sources alive in a process.
///
/// Subscribing replays every live source before any source created later,
/// so watchers never miss a source regardless of start-up order.
#[derive(Default)]
pub struct SourceRegistry {
    state: Mutex<RegistryState>,
}

impl SourceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a named source and announce it to every watcher.
    pub fn create_source(&self, name: impl Into<String>) -> Arc<EventSource> {
        let source = Arc::new(EventSource::new(name));

        let watchers = {
            let mut state = self.state.lock();
            state.sources.retain(|s| s.strong_count() > 0);
            state.sources.push(Arc::downgrade(&source));
            state.watchers.clone()
        };

        tracing::debug!(source = %source.name(), watchers = watchers.len(), "Event source created");

        for watcher in watchers {
            watcher.gate.pass(|| watcher.observer.on_source(&source));
        }
        source
    }

    /// Watch for sources. Live sources are announced before this returns.
    pub fn subscribe(self: &Arc<Self>, observer: Arc<dyn SourceObserver>) -> Subscription {
        let (watcher, existing) = {
            let mut state = self.state.lock();
            let watcher = Arc::new(Watcher {
                id: state.next_id,
                observer,
                gate: Gate::new(),
            });
            state.next_id += 1;
            state.watchers.push(watcher.clone());
            let existing: Vec<_> = state.sources.iter().filter_map(Weak::upgrade).collect();
            (watcher, existing)
        };

        for source in &existing {
            watcher.gate.pass(|| watcher.observer.on_source(source));
        }

        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            watcher.gate.close();
            if let Some(registry) = registry.upgrade() {
                registry.state.lock().watchers.retain(|w| w.id != watcher.id);
            }
        })
    }

    /// Sources that are still alive.
    pub fn sources(&self) -> Vec<Arc<EventSource>> {
        self.state
            .lock()
            .sources
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SourceRegistry")
            .field("sources", &state.sources.len())
            .field("watchers", &state.watchers.len())
            .finish()
    }
}
