//! Process-wide observability setup.
//!
//! # Data Flow
//! ```text
//! LoggingConfig
//!     → logging.rs (EnvFilter + fmt layer, pretty or JSON)
//!     → global tracing subscriber
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured filter
//! - Installing twice is an error, not a panic

pub mod logging;

pub use logging::{init_logging, LoggingError};
