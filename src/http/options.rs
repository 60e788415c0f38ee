//! Options for HTTP SLI metrics.

use std::fmt;
use std::sync::Arc;

use crate::config::schema::{
    DurationMetricType, MetricsConfig, DEFAULT_HISTOGRAM_BUCKETS, DEFAULT_SUMMARY_OBJECTIVES,
};
use crate::sink::{HistogramConfig, MetricConfig, Objective, SummaryConfig};

/// Decides whether a request path is instrumented.
pub type PathPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Adjusts a metric's configuration before it is registered.
pub type Configure<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

#[derive(Clone)]
pub struct HttpMetricsOptions {
    pub should_instrument: PathPredicate,
    pub duration_metric_type: DurationMetricType,
    pub histogram_buckets: Vec<f64>,
    pub summary_objectives: Vec<Objective>,
    pub configure_errors_total: Option<Configure<MetricConfig>>,
    pub configure_requests_in_progress: Option<Configure<MetricConfig>>,
    pub configure_duration_histogram: Option<Configure<HistogramConfig>>,
    pub configure_duration_summary: Option<Configure<SummaryConfig>>,
}

impl Default for HttpMetricsOptions {
    fn default() -> Self {
        Self {
            should_instrument: exclude_paths(vec!["/metrics".to_string()]),
            duration_metric_type: DurationMetricType::Histogram,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
            summary_objectives: DEFAULT_SUMMARY_OBJECTIVES.to_vec(),
            configure_errors_total: None,
            configure_requests_in_progress: None,
            configure_duration_histogram: None,
            configure_duration_summary: None,
        }
    }
}

impl HttpMetricsOptions {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            should_instrument: exclude_paths(config.exclude_paths.clone()),
            duration_metric_type: config.duration_metric_type,
            histogram_buckets: config.histogram_buckets.clone(),
            summary_objectives: config.summary_objectives.clone(),
            ..Self::default()
        }
    }

    pub fn should_instrument(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.should_instrument = Arc::new(predicate);
        self
    }

    pub fn duration_metric_type(mut self, metric_type: DurationMetricType) -> Self {
        self.duration_metric_type = metric_type;
        self
    }

    pub fn configure_errors_total(
        mut self,
        configure: impl Fn(&mut MetricConfig) + Send + Sync + 'static,
    ) -> Self {
        self.configure_errors_total = Some(Arc::new(configure));
        self
    }

    pub fn configure_requests_in_progress(
        mut self,
        configure: impl Fn(&mut MetricConfig) + Send + Sync + 'static,
    ) -> Self {
        self.configure_requests_in_progress = Some(Arc::new(configure));
        self
    }

    pub fn configure_duration_histogram(
        mut self,
        configure: impl Fn(&mut HistogramConfig) + Send + Sync + 'static,
    ) -> Self {
        self.configure_duration_histogram = Some(Arc::new(configure));
        self
    }

    pub fn configure_duration_summary(
        mut self,
        configure: impl Fn(&mut SummaryConfig) + Send + Sync + 'static,
    ) -> Self {
        self.configure_duration_summary = Some(Arc::new(configure));
        self
    }

    pub fn is_instrumented(&self, path: &str) -> bool {
        (self.should_instrument)(path)
    }
}

impl fmt::Debug for HttpMetricsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMetricsOptions")
            .field("duration_metric_type", &self.duration_metric_type)
            .field("histogram_buckets", &self.histogram_buckets)
            .field("summary_objectives", &self.summary_objectives)
            .finish_non_exhaustive()
    }
}

/// Predicate instrumenting every path except those under `prefixes`.
pub fn exclude_paths(prefixes: Vec<String>) -> PathPredicate {
    Arc::new(move |path: &str| !prefixes.iter().any(|prefix| starts_with_segments(path, prefix)))
}

/// Whether `path` equals `prefix` or continues it with a new segment.
/// Comparison ignores ASCII case; a trailing `/` on `prefix` is ignored.
pub fn starts_with_segments(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    if path.len() < prefix.len() || !path.is_char_boundary(prefix.len()) {
        return false;
    }

    let (head, rest) = path.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix) && (rest.is_empty() || rest.starts_with('/'))
}
