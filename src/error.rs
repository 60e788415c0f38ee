//! Error types for setup-time failures.
//!
//! Request-time paths never return these: anything that goes wrong while a
//! request is being observed is logged and skipped.

use thiserror::Error;

/// Errors raised while creating or using metric families.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("metric {metric} must keep labels {expected:?}, configured with {actual:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("metric {metric} expects {expected} label values, got {actual}")]
    LabelArity {
        metric: String,
        expected: usize,
        actual: usize,
    },

    #[error("metric {metric} has invalid buckets: {reason}")]
    InvalidBuckets { metric: String, reason: String },

    #[error("metric {metric} has invalid objective {quantile}/{epsilon}")]
    InvalidObjective {
        metric: String,
        quantile: f64,
        epsilon: f64,
    },

    #[error("metric {metric} is already registered as a {existing}")]
    KindConflict {
        metric: String,
        existing: &'static str,
    },

    #[error("exporter configuration is sealed, cannot configure {metric}")]
    Sealed { metric: String },

    #[error("exporter rejected configuration: {0}")]
    Exporter(String),
}

/// Errors raised while composing or starting instrumentation.
#[derive(Debug, Error)]
pub enum InstrumentationError {
    #[error("event source name is required")]
    MissingSourceName,

    #[error("instrumentation {name} failed to start: {reason}")]
    Start { name: String, reason: String },

    #[error(transparent)]
    Metric(#[from] MetricError),
}
