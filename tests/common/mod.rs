//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use metrics_util::MetricKind;
use parking_lot::Mutex;
use std::sync::Arc;
use tower::ServiceExt;

use sli_metrics::config::AppConfig;
use sli_metrics::events::SourceRegistry;
use sli_metrics::http::diagnostics::SOURCE_NAME;
use sli_metrics::http::{HttpMetricsOptions, HttpServer};
use sli_metrics::sink::{MetricSink, RecorderSink};
use sli_metrics::{InstrumentationHost, ObservabilityBuilder};

/// Demo service wired to a metric sink, with instrumentation started.
pub struct TestApp {
    pub router: Router,
    pub host: InstrumentationHost,
    pub registry: Arc<SourceRegistry>,
}

impl TestApp {
    pub fn start(options: HttpMetricsOptions, sink: &dyn MetricSink) -> Self {
        let registry = SourceRegistry::new();
        let host = ObservabilityBuilder::new(registry.clone())
            .add_http_metrics(options, sink)
            .unwrap()
            .build();
        host.start().unwrap();

        let source = registry.create_source(SOURCE_NAME);
        let server = HttpServer::new(AppConfig::default(), source, None);
        Self {
            router: server.router(),
            host,
            registry,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        get(&self.router, uri).await
    }
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// App backed by a [`DebuggingRecorder`], for asserting on recorded values.
pub struct DebugApp {
    pub app: TestApp,
    pub snapshotter: Snapshotter,
}

impl DebugApp {
    pub fn start(options: HttpMetricsOptions) -> Self {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let sink = RecorderSink::new(Arc::new(recorder));
        Self {
            app: TestApp::start(options, &sink),
            snapshotter,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(
            self.snapshotter
                .snapshot()
                .into_vec()
                .into_iter()
                .map(|(key, _, _, value)| {
                    let (kind, key) = key.into_parts();
                    let labels = key
                        .labels()
                        .map(|l| (l.key().to_string(), l.value().to_string()))
                        .collect();
                    Series {
                        kind,
                        name: key.name().to_string(),
                        labels,
                        value,
                    }
                })
                .collect(),
        )
    }
}

pub struct Series {
    pub kind: MetricKind,
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: DebugValue,
}

/// Flattened view of one recorder snapshot. Histogram samples are drained
/// by taking a snapshot, so take one per set of assertions.
pub struct Snapshot(pub Vec<Series>);

impl Snapshot {
    pub fn find(&self, kind: MetricKind, name: &str, labels: &[(&str, &str)]) -> Option<&DebugValue> {
        self.0
            .iter()
            .find(|s| {
                s.kind == kind
                    && s.name == name
                    && s.labels.len() == labels.len()
                    && labels
                        .iter()
                        .all(|(k, v)| s.labels.iter().any(|(lk, lv)| lk == k && lv == v))
            })
            .map(|s| &s.value)
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        match self.find(MetricKind::Counter, name, labels)? {
            DebugValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.find(MetricKind::Gauge, name, labels)? {
            DebugValue::Gauge(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Option<Vec<f64>> {
        match self.find(MetricKind::Histogram, name, labels)? {
            DebugValue::Histogram(v) => Some(v.iter().map(|x| x.0).collect()),
            _ => None,
        }
    }

    /// Number of series named `name` that carry an observation.
    pub fn observed(&self, name: &str) -> usize {
        self.0
            .iter()
            .filter(|s| s.name == name)
            .filter(|s| match &s.value {
                DebugValue::Counter(v) => *v > 0,
                DebugValue::Histogram(v) => !v.is_empty(),
                _ => true,
            })
            .count()
    }
}

/// Recorder that logs every metric operation in call order.
#[derive(Clone, Default)]
pub struct RecordingRecorder {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingRecorder {
    pub fn operations(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn handle(&self, key: &Key) -> Arc<Operation> {
        Arc::new(Operation {
            name: key.name().to_string(),
            log: self.log.clone(),
        })
    }
}

struct Operation {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Operation {
    fn push(&self, op: &str) {
        self.log.lock().push(format!("{} {}", op, self.name));
    }
}

impl CounterFn for Operation {
    fn increment(&self, _value: u64) {
        self.push("increment");
    }

    fn absolute(&self, _value: u64) {
        self.push("absolute");
    }
}

impl GaugeFn for Operation {
    fn increment(&self, _value: f64) {
        self.push("increment");
    }

    fn decrement(&self, _value: f64) {
        self.push("decrement");
    }

    fn set(&self, _value: f64) {
        self.push("set");
    }
}

impl HistogramFn for Operation {
    fn record(&self, _value: f64) {
        self.push("record");
    }
}

impl Recorder for RecordingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle(key))
    }
}
