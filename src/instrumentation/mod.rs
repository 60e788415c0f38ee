//! Instrumentation composition.
//!
//! # Data Flow
//! ```text
//! ObservabilityBuilder
//!     .add_http_metrics(options, sink)   → HttpMetricsObserver behind an event handler
//!     .add_event_handler(source, ...)    → DiagnosticInstrumentation
//!     .build()                           → InstrumentationHost
//!
//! InstrumentationHost::start → DiagnosticInstrumentation::start
//!     → SourceRegistry::subscribe (existing and future sources)
//!     → matching EventSource::subscribe(handler)
//!
//! InstrumentationHost::stop → every subscription revoked
//! ```

pub mod builder;
pub mod diagnostic;
pub mod host;

pub use builder::ObservabilityBuilder;
pub use diagnostic::{DiagnosticInstrumentation, HandlerFactory, SourceFilter};
pub use host::InstrumentationHost;

use crate::error::InstrumentationError;

/// A component that observes the process once started.
pub trait Instrumentation: Send + Sync {
    fn name(&self) -> &str;

    /// Begin observing. Starting twice is a no-op.
    fn start(&self) -> Result<(), InstrumentationError>;

    /// Stop observing. Never fails and may be called repeatedly; once it
    /// returns, no handler owned by this component is invoked again.
    fn stop(&self);
}
