//! Fluent composition of instrumentation components.

use std::sync::Arc;

use crate::error::InstrumentationError;
use crate::events::{EnabledFilter, EventObserver, Reflect, SourceRegistry};
use crate::http::diagnostics::{LIFECYCLE_EVENTS, SOURCE_NAME};
use crate::http::{HttpEventDispatcher, HttpMetricsObserver, HttpMetricsOptions};
use crate::instrumentation::{DiagnosticInstrumentation, Instrumentation, InstrumentationHost};
use crate::sink::MetricSink;

/// Collects instrumentation and produces an [`InstrumentationHost`].
///
/// ```ignore
/// let host = ObservabilityBuilder::new(registry)
///     .add_http_metrics(HttpMetricsOptions::default(), &sink)?
///     .build();
/// host.start()?;
/// ```
pub struct ObservabilityBuilder {
    registry: Arc<SourceRegistry>,
    instrumentations: Vec<Arc<dyn Instrumentation>>,
}

impl ObservabilityBuilder {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            instrumentations: Vec::new(),
        }
    }

    pub fn add_instrumentation(mut self, instrumentation: impl Instrumentation + 'static) -> Self {
        self.instrumentations.push(Arc::new(instrumentation));
        self
    }

    /// Subscribe `handler` to every source named `source`.
    pub fn add_event_handler(
        self,
        source: &str,
        handler: Arc<dyn EventObserver>,
        filter: Option<EnabledFilter>,
    ) -> Result<Self, InstrumentationError> {
        if source.trim().is_empty() {
            return Err(InstrumentationError::MissingSourceName);
        }

        let instrumentation =
            DiagnosticInstrumentation::for_source(self.registry.clone(), source, handler, filter);
        Ok(self.add_instrumentation(instrumentation))
    }

    /// Register the HTTP SLI metrics observer on the request lifecycle
    /// source. Metric families are created here, so configuration errors
    /// surface before anything starts.
    pub fn add_http_metrics(
        self,
        options: HttpMetricsOptions,
        sink: &dyn MetricSink,
    ) -> Result<Self, InstrumentationError> {
        let observer = HttpMetricsObserver::new(options, sink)?;
        let handler: Arc<dyn EventObserver> = Arc::new(HttpEventDispatcher::new(observer));
        let filter: EnabledFilter = Arc::new(
            |event: &str, _: Option<&dyn Reflect>, _: Option<&dyn Reflect>| {
                LIFECYCLE_EVENTS.iter().any(|name| *name == event)
            },
        );

        self.add_event_handler(SOURCE_NAME, handler, Some(filter))
    }

    pub fn build(self) -> InstrumentationHost {
        tracing::debug!(count = self.instrumentations.len(), "Building instrumentation host");
        InstrumentationHost::new(self.instrumentations)
    }
}
