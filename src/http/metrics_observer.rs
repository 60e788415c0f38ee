//! SLI metrics from request lifecycle events.
//!
//! # Metrics
//! - `http_server_requests_in_progress` (gauge): requests between route
//!   match and completion, by `operation`
//! - `http_server_request_duration_seconds` (histogram or summary): by
//!   `operation` and `status_code`
//! - `http_server_errors_total` (counter): by `operation`, `sli_error_type`
//!   and `sli_dependency`
//!
//! Requests that never resolve an operation record nothing, which keeps
//! label cardinality bounded by the set of routes.

use metrics::Unit;
use std::error::Error;
use std::time::Instant;

use crate::config::schema::DurationMetricType;
use crate::error::MetricError;
use crate::http::classifier::classify;
use crate::http::context::RequestContext;
use crate::http::observer::HttpObserver;
use crate::http::options::HttpMetricsOptions;
use crate::http::sli::SliError;
use crate::http::state::ItemKey;
use crate::sink::{
    CounterFamily, Family, GaugeFamily, HistogramConfig, HistogramFamily, MetricConfig,
    MetricDescriptor, MetricSink, SummaryConfig,
};

pub const REQUESTS_IN_PROGRESS: &str = "http_server_requests_in_progress";
pub const REQUEST_DURATION: &str = "http_server_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "http_server_errors_total";

const REQUESTS_IN_PROGRESS_HELP: &str =
    "The number of HTTP requests currently being processed by the application";
const REQUEST_DURATION_HELP: &str = "The duration in seconds that HTTP requests take to process";
const ERRORS_TOTAL_HELP: &str = "The number of HTTP requests resulting in an error";

/// Operation whose in-progress gauge this request incremented.
const IN_FLIGHT: ItemKey<String> = ItemKey::new("sli.in_flight_operation");

pub fn requests_in_progress_descriptor() -> MetricDescriptor {
    MetricDescriptor::new(REQUESTS_IN_PROGRESS, REQUESTS_IN_PROGRESS_HELP, &["operation"])
}

pub fn request_duration_descriptor() -> MetricDescriptor {
    MetricDescriptor::new(
        REQUEST_DURATION,
        REQUEST_DURATION_HELP,
        &["operation", "status_code"],
    )
    .with_unit(Unit::Seconds)
}

pub fn errors_total_descriptor() -> MetricDescriptor {
    MetricDescriptor::new(
        ERRORS_TOTAL,
        ERRORS_TOTAL_HELP,
        &["operation", "sli_error_type", "sli_dependency"],
    )
}

/// Name used for a request's metrics: an explicitly set operation, else the
/// endpoint's logical name, else `"<METHOD> <route template>"`.
pub fn resolve_operation(context: &RequestContext) -> Option<String> {
    if let Some(operation) = context.operation() {
        return Some(operation);
    }

    let endpoint = context.endpoint()?;
    if let Some(name) = &endpoint.name {
        return Some(name.clone());
    }
    endpoint
        .route_template
        .as_ref()
        .map(|template| format!("{} {}", context.method(), template))
}

pub struct HttpMetricsObserver {
    options: HttpMetricsOptions,
    requests_in_progress: GaugeFamily,
    request_duration: HistogramFamily,
    errors_total: CounterFamily,
}

impl HttpMetricsObserver {
    /// Register the three metrics on `sink`. Fails if an override changes a
    /// label set or carries invalid buckets or objectives.
    pub fn new(options: HttpMetricsOptions, sink: &dyn MetricSink) -> Result<Self, MetricError> {
        let descriptor = errors_total_descriptor();
        let mut config = MetricConfig::for_descriptor(&descriptor);
        if let Some(configure) = &options.configure_errors_total {
            configure(&mut config);
        }
        let errors_total = sink.counter(&descriptor, &config)?;

        let descriptor = requests_in_progress_descriptor();
        let mut config = MetricConfig::for_descriptor(&descriptor);
        if let Some(configure) = &options.configure_requests_in_progress {
            configure(&mut config);
        }
        let requests_in_progress = sink.gauge(&descriptor, &config)?;

        let descriptor = request_duration_descriptor();
        let request_duration = match options.duration_metric_type {
            DurationMetricType::Histogram => {
                let mut config =
                    HistogramConfig::for_descriptor(&descriptor, &options.histogram_buckets);
                if let Some(configure) = &options.configure_duration_histogram {
                    configure(&mut config);
                }
                sink.histogram(&descriptor, &config)?
            }
            DurationMetricType::Summary => {
                let mut config =
                    SummaryConfig::for_descriptor(&descriptor, &options.summary_objectives);
                if let Some(configure) = &options.configure_duration_summary {
                    configure(&mut config);
                }
                sink.summary(&descriptor, &config)?
            }
        };

        tracing::debug!(
            duration_metric_type = ?options.duration_metric_type,
            "HTTP SLI metrics registered"
        );

        Ok(Self {
            options,
            requests_in_progress,
            request_duration,
            errors_total,
        })
    }

    pub fn options(&self) -> &HttpMetricsOptions {
        &self.options
    }

    fn child<H>(family: &Family<H>, values: &[&str]) -> Option<H> {
        match family.with_labels(values) {
            Ok(child) => Some(child),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping metric observation");
                None
            }
        }
    }
}

impl HttpObserver for HttpMetricsObserver {
    fn on_request_started(&self, context: &RequestContext) {
        if !self.options.is_instrumented(context.path()) {
            return;
        }
        context.set_request_timestamp(Instant::now());
    }

    fn on_endpoint_matched(&self, context: &RequestContext) {
        if !self.options.is_instrumented(context.path()) {
            return;
        }
        let Some(operation) = resolve_operation(context) else {
            return;
        };

        context.set_derived_operation(&operation);
        if context.items().insert_if_absent(IN_FLIGHT, operation.clone()) {
            if let Some(gauge) = Self::child(&self.requests_in_progress, &[operation.as_str()]) {
                gauge.increment(1.0);
            }
        }
    }

    fn on_unhandled_exception(
        &self,
        context: &RequestContext,
        error: &(dyn Error + Send + Sync + 'static),
    ) {
        let mut current: Option<&(dyn Error + 'static)> = Some(error);
        while let Some(e) = current {
            if let Some(sli) = e.downcast_ref::<SliError>() {
                context.set_sli_error(sli.kind, sli.dependency.as_deref());
                return;
            }
            current = e.source();
        }
    }

    fn on_request_completed(&self, context: &RequestContext) {
        if !self.options.is_instrumented(context.path()) {
            return;
        }
        let Some(operation) = context.operation() else {
            tracing::trace!(path = %context.path(), "Completed request has no operation");
            return;
        };

        let status = context.status();
        let duration = context.request_duration(Instant::now());
        let status_code = status.to_string();
        let labels = [operation.as_str(), status_code.as_str()];
        if let Some(histogram) = Self::child(&self.request_duration, &labels) {
            histogram.record(duration.as_secs_f64());
        }

        if let Some(error) = classify(context.sli_error(), status) {
            let labels = [operation.as_str(), error.kind.as_str(), error.dependency_label()];
            if let Some(counter) = Self::child(&self.errors_total, &labels) {
                counter.increment(1);
            }
        }

        if let Some(in_flight) = context.items().remove(IN_FLIGHT) {
            if let Some(gauge) = Self::child(&self.requests_in_progress, &[in_flight.as_str()]) {
                gauge.decrement(1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::Endpoint;
    use crate::http::sli::ErrorKind;
    use crate::sink::RecorderSink;
    use axum::http::Method;
    use metrics::{Key, Label};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
    use metrics_util::{CompositeKey, MetricKind};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::fmt;
    use std::sync::Arc;

    struct Harness {
        observer: HttpMetricsObserver,
        snapshotter: Snapshotter,
    }

    impl Harness {
        fn new(options: HttpMetricsOptions) -> Self {
            let recorder = DebuggingRecorder::new();
            let snapshotter = recorder.snapshotter();
            let sink = RecorderSink::new(Arc::new(recorder));
            Self {
                observer: HttpMetricsObserver::new(options, &sink).unwrap(),
                snapshotter,
            }
        }

        fn values(&self) -> HashMap<CompositeKey, DebugValue> {
            self.snapshotter
                .snapshot()
                .into_vec()
                .into_iter()
                .map(|(key, _, _, value)| (key, value))
                .collect()
        }
    }

    fn key(kind: MetricKind, name: &str, labels: &[(&str, &str)]) -> CompositeKey {
        let labels: Vec<Label> = labels
            .iter()
            .map(|(k, v)| Label::new(k.to_string(), v.to_string()))
            .collect();
        CompositeKey::new(kind, Key::from_parts(name.to_string(), labels))
    }

    fn status_request(code: u16) -> RequestContext {
        let context = RequestContext::new(Method::GET, format!("/demo/status/{code}"));
        context.set_endpoint(Endpoint::named("get_status", "/demo/status/{code}"));
        context
    }

    fn run(observer: &HttpMetricsObserver, context: &RequestContext, status: u16) {
        observer.on_request_started(context);
        observer.on_endpoint_matched(context);
        context.set_status(status);
        observer.on_request_completed(context);
    }

    #[test]
    fn test_resolve_operation_order() {
        let context = RequestContext::new(Method::GET, "/demo/status/200");
        assert_eq!(resolve_operation(&context), None);

        context.set_endpoint(Endpoint::unnamed("/demo/status/{code}"));
        assert_eq!(
            resolve_operation(&context).as_deref(),
            Some("GET /demo/status/{code}")
        );

        let named = status_request(200);
        assert_eq!(resolve_operation(&named).as_deref(), Some("get_status"));

        named.set_operation("explicit");
        assert_eq!(resolve_operation(&named).as_deref(), Some("explicit"));
    }

    #[test]
    fn test_successful_request() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = status_request(200);

        harness.observer.on_request_started(&context);
        harness.observer.on_endpoint_matched(&context);

        let values = harness.values();
        assert_eq!(
            values.get(&key(MetricKind::Gauge, REQUESTS_IN_PROGRESS, &[("operation", "get_status")])),
            Some(&DebugValue::Gauge(1.0.into()))
        );

        harness.observer.on_request_completed(&context);
        let values = harness.values();

        assert_eq!(
            values.get(&key(MetricKind::Gauge, REQUESTS_IN_PROGRESS, &[("operation", "get_status")])),
            Some(&DebugValue::Gauge(0.0.into()))
        );
        match values.get(&key(
            MetricKind::Histogram,
            REQUEST_DURATION,
            &[("operation", "get_status"), ("status_code", "200")],
        )) {
            Some(DebugValue::Histogram(observations)) => assert_eq!(observations.len(), 1),
            other => panic!("unexpected duration value: {other:?}"),
        }
        assert!(!values.keys().any(|k| k.key().name() == ERRORS_TOTAL));
    }

    #[test]
    fn test_no_operation_records_nothing() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = RequestContext::new(Method::GET, "/unknown");
        run(&harness.observer, &context, 404);

        assert!(harness.values().is_empty());
    }

    #[test]
    fn test_excluded_path_records_nothing() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = RequestContext::new(Method::GET, "/metrics");
        context.set_endpoint(Endpoint::named("metrics", "/metrics"));
        run(&harness.observer, &context, 200);

        assert!(harness.values().is_empty());
        assert!(context.request_timestamp().is_none());
    }

    #[test]
    fn test_status_based_errors() {
        let harness = Harness::new(HttpMetricsOptions::default());
        run(&harness.observer, &status_request(422), 422);
        run(&harness.observer, &status_request(504), 504);
        run(&harness.observer, &status_request(200), 200);

        let values = harness.values();
        let errors = |kind: &str| {
            values
                .get(&key(
                    MetricKind::Counter,
                    ERRORS_TOTAL,
                    &[
                        ("operation", "get_status"),
                        ("sli_error_type", kind),
                        ("sli_dependency", ""),
                    ],
                ))
                .map(|value| match value {
                    DebugValue::Counter(c) => DebugValue::Counter(*c),
                    DebugValue::Gauge(g) => DebugValue::Gauge(*g),
                    DebugValue::Histogram(h) => DebugValue::Histogram(h.clone()),
                })
        };
        assert_eq!(errors("invalid_request"), Some(DebugValue::Counter(1)));
        assert_eq!(errors("internal"), Some(DebugValue::Counter(1)));
    }

    #[test]
    fn test_explicit_error_beats_status() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = status_request(503);
        harness.observer.on_request_started(&context);
        harness.observer.on_endpoint_matched(&context);
        context.set_sli_error(ErrorKind::InternalDependency, Some("svc-a"));
        context.set_status(503);
        harness.observer.on_request_completed(&context);

        let values = harness.values();
        assert_eq!(
            values.get(&key(
                MetricKind::Counter,
                ERRORS_TOTAL,
                &[
                    ("operation", "get_status"),
                    ("sli_error_type", "internal_dependency"),
                    ("sli_dependency", "svc-a"),
                ],
            )),
            Some(&DebugValue::Counter(1))
        );
        assert!(!values.contains_key(&key(
            MetricKind::Counter,
            ERRORS_TOTAL,
            &[
                ("operation", "get_status"),
                ("sli_error_type", "internal"),
                ("sli_dependency", ""),
            ],
        )));
    }

    #[derive(Debug)]
    struct Wrapped(SliError);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_exception_chain_is_classified() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = status_request(500);

        let error = Wrapped(SliError::with_dependency(ErrorKind::ExternalDependency, "sliex_dependency"));
        harness.observer.on_unhandled_exception(&context, &error);

        let classification = context.sli_error().unwrap();
        assert_eq!(classification.kind, ErrorKind::ExternalDependency);
        assert_eq!(classification.dependency_label(), "sliex_dependency");

        // Unrelated errors leave the scope alone.
        let other = status_request(500);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        harness.observer.on_unhandled_exception(&other, &io);
        assert!(other.sli_error().is_none());
    }

    #[test]
    fn test_duration_without_start_is_zero() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = status_request(200);
        harness.observer.on_endpoint_matched(&context);
        harness.observer.on_request_completed(&context);

        match harness.values().get(&key(
            MetricKind::Histogram,
            REQUEST_DURATION,
            &[("operation", "get_status"), ("status_code", "200")],
        )) {
            Some(DebugValue::Histogram(observations)) => {
                assert_eq!(observations.len(), 1);
                assert_eq!(observations[0].into_inner(), 0.0);
            }
            other => panic!("unexpected duration value: {other:?}"),
        }
    }

    #[test]
    fn test_completion_without_match_leaves_gauge_alone() {
        let harness = Harness::new(HttpMetricsOptions::default());
        let context = RequestContext::new(Method::GET, "/demo/status/200");
        context.set_operation("explicit_only");
        harness.observer.on_request_completed(&context);

        let values = harness.values();
        assert!(!values.keys().any(|k| k.key().name() == REQUESTS_IN_PROGRESS));
        assert!(values.keys().any(|k| k.key().name() == REQUEST_DURATION));
    }

    #[test]
    fn test_label_override_fails_construction() {
        let recorder = DebuggingRecorder::new();
        let sink = RecorderSink::new(Arc::new(recorder));
        let options = HttpMetricsOptions::default().configure_errors_total(|config| {
            config.label_names = vec!["operation".to_string()];
        });

        let result = HttpMetricsObserver::new(options, &sink);
        assert!(matches!(result, Err(MetricError::LabelMismatch { .. })));
    }

    #[test]
    fn test_bucket_override_is_applied() {
        let recorder = DebuggingRecorder::new();
        let sink = RecorderSink::new(Arc::new(recorder));
        let options = HttpMetricsOptions::default().configure_duration_histogram(|config| {
            config.buckets = vec![];
        });

        let result = HttpMetricsObserver::new(options, &sink);
        assert!(matches!(result, Err(MetricError::InvalidBuckets { .. })));
    }

    /// Records which factory created each metric.
    struct FactoryLog {
        inner: RecorderSink,
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl FactoryLog {
        fn new() -> Self {
            Self {
                inner: RecorderSink::new(Arc::new(DebuggingRecorder::new())),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn kinds_of(&self, name: &str) -> Vec<&'static str> {
            self.calls
                .lock()
                .iter()
                .filter(|(_, metric)| metric == name)
                .map(|(kind, _)| *kind)
                .collect()
        }
    }

    impl MetricSink for FactoryLog {
        fn counter(&self, d: &MetricDescriptor, c: &MetricConfig) -> Result<CounterFamily, MetricError> {
            self.calls.lock().push(("counter", d.name.clone()));
            self.inner.counter(d, c)
        }

        fn gauge(&self, d: &MetricDescriptor, c: &MetricConfig) -> Result<GaugeFamily, MetricError> {
            self.calls.lock().push(("gauge", d.name.clone()));
            self.inner.gauge(d, c)
        }

        fn histogram(&self, d: &MetricDescriptor, c: &HistogramConfig) -> Result<HistogramFamily, MetricError> {
            self.calls.lock().push(("histogram", d.name.clone()));
            self.inner.histogram(d, c)
        }

        fn summary(&self, d: &MetricDescriptor, c: &SummaryConfig) -> Result<HistogramFamily, MetricError> {
            self.calls.lock().push(("summary", d.name.clone()));
            self.inner.summary(d, c)
        }
    }

    #[test]
    fn test_duration_metric_type_selects_one_metric() {
        let sink = FactoryLog::new();
        HttpMetricsObserver::new(HttpMetricsOptions::default(), &sink).unwrap();
        assert_eq!(sink.kinds_of(REQUEST_DURATION), vec!["histogram"]);

        let sink = FactoryLog::new();
        let options = HttpMetricsOptions::default().duration_metric_type(DurationMetricType::Summary);
        HttpMetricsObserver::new(options, &sink).unwrap();
        assert_eq!(sink.kinds_of(REQUEST_DURATION), vec!["summary"]);
    }
}
