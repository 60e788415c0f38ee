//! HTTP SLI metrics instrumentation.
//!
//! Listens to the lifecycle events an HTTP pipeline publishes on a shared
//! event bus and turns them into service-level-indicator metrics keyed by a
//! normalized operation name:
//!
//! - `http_server_requests_in_progress` (gauge)
//! - `http_server_request_duration_seconds` (histogram or summary)
//! - `http_server_errors_total` (counter)

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod instrumentation;
pub mod lifecycle;
pub mod observability;
pub mod sink;

pub use config::AppConfig;
pub use error::{InstrumentationError, MetricError};
pub use http::{ErrorKind, HttpMetricsObserver, HttpMetricsOptions, RequestContext, SliError};
pub use instrumentation::{InstrumentationHost, ObservabilityBuilder};
pub use lifecycle::Shutdown;
