//! HTTP request instrumentation.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → diagnostics.rs (create RequestContext, publish lifecycle events)
//!     → EventSource "sli.http.server"
//!     → observer.rs (HttpEventDispatcher: untyped event → typed callback)
//!     → metrics_observer.rs
//!         ├─ state.rs (operation, start timestamp, SLI error on the context)
//!         ├─ classifier.rs (explicit error / status code → error kind)
//!         └─ sink (gauge, duration, error counter)
//! ```
//!
//! # Design Decisions
//! - The context is the only correlation key between lifecycle events
//! - No matched operation, no metrics
//! - Explicit SLI errors take precedence over status codes

pub mod classifier;
pub mod context;
pub mod demo;
pub mod diagnostics;
pub mod metrics_observer;
pub mod observer;
pub mod options;
pub mod server;
pub mod sli;
pub mod state;

pub use classifier::classify;
pub use context::{Endpoint, RequestContext};
pub use diagnostics::{diagnostics_middleware, DiagnosticsState, EndpointCatalog, UnhandledError};
pub use metrics_observer::{resolve_operation, HttpMetricsObserver};
pub use observer::{HttpEventDispatcher, HttpObserver};
pub use options::HttpMetricsOptions;
pub use server::HttpServer;
pub use sli::{ErrorKind, SliError, UnknownErrorKind};
pub use state::{ItemKey, Items};
