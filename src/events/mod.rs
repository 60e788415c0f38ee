//! In-process event bus.
//!
//! # Data Flow
//! ```text
//! SourceRegistry::create_source(name)
//!     → announces the new EventSource to every registry subscriber
//!
//! EventSource::write(event, payload)
//!     → snapshot of subscribers (copy-on-write list)
//!     → per-subscriber enabled filter
//!     → EventObserver::on_next(event, payload)
//!
//! Payload inspection:
//!     &dyn Reflect → FieldFetcher<T> (cached per payload shape) → Option<&T>
//! ```
//!
//! # Design Decisions
//! - Registry is an explicit object, there is no process-wide instance
//! - Delivery is synchronous on the producer's thread
//! - Revoking a subscription waits for in-flight deliveries to that subscriber
//! - Payloads are untyped at the boundary; consumers fetch fields by name

pub mod payload;
pub mod registry;
pub mod source;
pub mod subscription;

pub use payload::{Field, FieldFetcher, FieldGetter, Reflect};
pub use registry::{SourceObserver, SourceRegistry};
pub use source::{EnabledFilter, EventObserver, EventSource};
pub use subscription::Subscription;
