//! Metric sink abstraction.
//!
//! # Data Flow
//! ```text
//! MetricDescriptor + config overrides
//!     → MetricSink::{counter, gauge, histogram, summary}
//!     → validate (label set fixed, buckets / objectives sane)
//!     → Family<H>
//!
//! Family::with_labels(values) → metrics::{Counter, Gauge, Histogram}
//! ```
//!
//! # Design Decisions
//! - Sinks are injected, the observer never touches a global recorder
//! - Overrides may tune buckets and objectives but never the label names
//! - Arity is checked per call to `with_labels`, not per observation

pub mod prometheus;
pub mod recorder;

use metrics::{Counter, Gauge, Histogram, Key, Label, Unit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::MetricError;

pub use self::prometheus::PrometheusSink;
pub use self::recorder::RecorderSink;

/// Name, help text and required labels of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub unit: Option<Unit>,
}

impl MetricDescriptor {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Overridable configuration for counters and gauges.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricConfig {
    pub label_names: Vec<String>,
}

impl MetricConfig {
    pub fn for_descriptor(descriptor: &MetricDescriptor) -> Self {
        Self {
            label_names: descriptor.label_names.clone(),
        }
    }
}

/// Overridable configuration for histograms.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramConfig {
    pub label_names: Vec<String>,
    pub buckets: Vec<f64>,
}

impl HistogramConfig {
    pub fn for_descriptor(descriptor: &MetricDescriptor, buckets: &[f64]) -> Self {
        Self {
            label_names: descriptor.label_names.clone(),
            buckets: buckets.to_vec(),
        }
    }
}

/// A target quantile with its allowed error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub quantile: f64,
    pub epsilon: f64,
}

impl Objective {
    pub const fn new(quantile: f64, epsilon: f64) -> Self {
        Self { quantile, epsilon }
    }
}

/// Overridable configuration for summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    pub label_names: Vec<String>,
    pub objectives: Vec<Objective>,
}

impl SummaryConfig {
    pub fn for_descriptor(descriptor: &MetricDescriptor, objectives: &[Objective]) -> Self {
        Self {
            label_names: descriptor.label_names.clone(),
            objectives: objectives.to_vec(),
        }
    }
}

/// Fails unless the configured labels are exactly the descriptor's.
pub fn check_labels(descriptor: &MetricDescriptor, configured: &[String]) -> Result<(), MetricError> {
    if descriptor.label_names.as_slice() == configured {
        return Ok(());
    }
    Err(MetricError::LabelMismatch {
        metric: descriptor.name.clone(),
        expected: descriptor.label_names.clone(),
        actual: configured.to_vec(),
    })
}

/// Buckets must be non-empty, finite and strictly increasing.
pub fn check_buckets(metric: &str, buckets: &[f64]) -> Result<(), MetricError> {
    let invalid = |reason: &str| MetricError::InvalidBuckets {
        metric: metric.to_string(),
        reason: reason.to_string(),
    };

    if buckets.is_empty() {
        return Err(invalid("no buckets"));
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(invalid("bucket bounds must be finite"));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(invalid("bucket bounds must be strictly increasing"));
    }
    Ok(())
}

/// Quantiles must lie in (0, 1] and epsilons in [0, 1).
pub fn check_objectives(metric: &str, objectives: &[Objective]) -> Result<(), MetricError> {
    for objective in objectives {
        let quantile_ok = objective.quantile > 0.0 && objective.quantile <= 1.0;
        let epsilon_ok = (0.0..1.0).contains(&objective.epsilon);
        if !quantile_ok || !epsilon_ok {
            return Err(MetricError::InvalidObjective {
                metric: metric.to_string(),
                quantile: objective.quantile,
                epsilon: objective.epsilon,
            });
        }
    }
    Ok(())
}

/// A metric with a fixed set of label names. Children are resolved per
/// label value set.
pub struct Family<H> {
    name: String,
    label_names: Vec<String>,
    register: Arc<dyn Fn(&Key) -> H + Send + Sync>,
}

impl<H> Family<H> {
    pub fn new(
        name: impl Into<String>,
        label_names: Vec<String>,
        register: impl Fn(&Key) -> H + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            label_names,
            register: Arc::new(register),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Resolve the child for `values`, given in label-name order.
    pub fn with_labels(&self, values: &[&str]) -> Result<H, MetricError> {
        if values.len() != self.label_names.len() {
            return Err(MetricError::LabelArity {
                metric: self.name.clone(),
                expected: self.label_names.len(),
                actual: values.len(),
            });
        }

        let labels = self
            .label_names
            .iter()
            .zip(values)
            .map(|(name, value)| Label::new(name.clone(), value.to_string()))
            .collect::<Vec<_>>();
        let key = Key::from_parts(self.name.clone(), labels);
        Ok((self.register)(&key))
    }
}

impl<H> Clone for Family<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            label_names: self.label_names.clone(),
            register: self.register.clone(),
        }
    }
}

impl<H> fmt::Debug for Family<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("name", &self.name)
            .field("label_names", &self.label_names)
            .finish()
    }
}

pub type CounterFamily = Family<Counter>;
pub type GaugeFamily = Family<Gauge>;
pub type HistogramFamily = Family<Histogram>;

/// Creates metric families on some backend.
pub trait MetricSink: Send + Sync {
    fn counter(
        &self,
        descriptor: &MetricDescriptor,
        config: &MetricConfig,
    ) -> Result<CounterFamily, MetricError>;

    fn gauge(
        &self,
        descriptor: &MetricDescriptor,
        config: &MetricConfig,
    ) -> Result<GaugeFamily, MetricError>;

    fn histogram(
        &self,
        descriptor: &MetricDescriptor,
        config: &HistogramConfig,
    ) -> Result<HistogramFamily, MetricError>;

    /// Summaries observe like histograms; the backend decides how the
    /// objectives are exported.
    fn summary(
        &self,
        descriptor: &MetricDescriptor,
        config: &SummaryConfig,
    ) -> Result<HistogramFamily, MetricError>;
}
