//! Subscription manager for named event sources.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::InstrumentationError;
use crate::events::{EnabledFilter, EventObserver, EventSource, SourceObserver, SourceRegistry, Subscription};
use crate::instrumentation::Instrumentation;

/// Builds the handler for a source, given the source's name.
pub type HandlerFactory = Arc<dyn Fn(&str) -> Arc<dyn EventObserver> + Send + Sync>;

/// Selects sources by name.
pub type SourceFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

struct Inner {
    name: String,
    registry: Arc<SourceRegistry>,
    handler_factory: HandlerFactory,
    source_filter: SourceFilter,
    enabled_filter: Option<EnabledFilter>,
    disposed: AtomicBool,
    all_sources: Mutex<Option<Subscription>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Inner {
    fn on_source(&self, source: &Arc<EventSource>) {
        if self.disposed.load(Ordering::Acquire) || !(self.source_filter)(source.name()) {
            return;
        }

        let mut subscriptions = self.subscriptions.lock();
        // Re-checked under the lock so disposal cannot miss this subscription.
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let handler = (self.handler_factory)(source.name());
        subscriptions.push(source.subscribe(handler, self.enabled_filter.clone()));
        tracing::debug!(
            instrumentation = %self.name,
            source = %source.name(),
            "Subscribed to event source"
        );
    }

    fn dispose(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let all_sources = self.all_sources.lock().take();
        if let Some(subscription) = all_sources {
            subscription.unsubscribe();
        }

        let mut subscriptions = self.subscriptions.lock();
        let count = subscriptions.len();
        for subscription in subscriptions.drain(..) {
            subscription.unsubscribe();
        }

        tracing::debug!(instrumentation = %self.name, subscriptions = count, "Instrumentation disposed");
    }
}

/// Registry watcher holding the manager weakly, so the registry never keeps
/// a dropped manager alive.
struct Watcher(Weak<Inner>);

impl SourceObserver for Watcher {
    fn on_source(&self, source: &Arc<EventSource>) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_source(source);
        }
    }
}

/// Subscribes a handler to every matching source, present and future.
///
/// Dropping the instrumentation disposes it.
pub struct DiagnosticInstrumentation {
    inner: Arc<Inner>,
}

impl DiagnosticInstrumentation {
    pub fn new(
        name: impl Into<String>,
        registry: Arc<SourceRegistry>,
        handler_factory: HandlerFactory,
        source_filter: SourceFilter,
        enabled_filter: Option<EnabledFilter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                registry,
                handler_factory,
                source_filter,
                enabled_filter,
                disposed: AtomicBool::new(false),
                all_sources: Mutex::new(None),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Handler for the single source called `source`.
    pub fn for_source(
        registry: Arc<SourceRegistry>,
        source: &str,
        handler: Arc<dyn EventObserver>,
        enabled_filter: Option<EnabledFilter>,
    ) -> Self {
        let wanted = source.to_string();
        Self::new(
            source,
            registry,
            Arc::new(move |_: &str| handler.clone()),
            Arc::new(move |name: &str| name == wanted),
            enabled_filter,
        )
    }

    /// Revoke every subscription. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Number of sources currently subscribed.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }
}

impl Instrumentation for DiagnosticInstrumentation {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn start(&self) -> Result<(), InstrumentationError> {
        let mut all_sources = self.inner.all_sources.lock();
        if self.is_disposed() {
            return Err(InstrumentationError::Start {
                name: self.inner.name.clone(),
                reason: "instrumentation was disposed".to_string(),
            });
        }
        if all_sources.is_some() {
            return Ok(());
        }

        let watcher = Arc::new(Watcher(Arc::downgrade(&self.inner)));
        *all_sources = Some(self.inner.registry.subscribe(watcher));
        tracing::info!(instrumentation = %self.inner.name, "Instrumentation started");
        Ok(())
    }

    fn stop(&self) {
        self.dispose();
    }
}

impl Drop for DiagnosticInstrumentation {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for DiagnosticInstrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticInstrumentation")
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
