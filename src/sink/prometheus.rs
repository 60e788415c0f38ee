//! Prometheus-backed sink.
//!
//! The exporter only accepts bucket and quantile settings before its
//! recorder is built, while families are created before anything is
//! recorded. The sink therefore collects configuration and builds the
//! recorder on first use: the first registered series or the first call
//! to [`PrometheusSink::handle`]. Configuring afterwards fails with
//! [`MetricError::Sealed`].

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::MetricError;
use crate::sink::recorder::MetricKind;
use crate::sink::{
    check_buckets, check_labels, check_objectives, CounterFamily, GaugeFamily, HistogramConfig,
    HistogramFamily, MetricConfig, MetricDescriptor, MetricSink, RecorderSink, SummaryConfig,
};

#[derive(Clone, Copy)]
enum DescribeKind {
    Counter,
    Gauge,
    Histogram,
}

struct Description {
    kind: DescribeKind,
    key: KeyName,
    unit: Option<Unit>,
    help: SharedString,
}

impl Description {
    fn apply(self, recorder: &dyn Recorder) {
        match self.kind {
            DescribeKind::Counter => recorder.describe_counter(self.key, self.unit, self.help),
            DescribeKind::Gauge => recorder.describe_gauge(self.key, self.unit, self.help),
            DescribeKind::Histogram => recorder.describe_histogram(self.key, self.unit, self.help),
        }
    }
}

#[derive(Default)]
struct Pending {
    buckets: Vec<(String, Vec<f64>)>,
    quantiles: Option<Vec<f64>>,
    global_labels: Vec<(String, String)>,
    descriptions: Vec<Description>,
    sealed: bool,
}

impl Pending {
    fn builder(&self) -> Result<PrometheusBuilder, BuildError> {
        let mut builder = PrometheusBuilder::new();
        if let Some(quantiles) = &self.quantiles {
            builder = builder.set_quantiles(quantiles)?;
        }
        for (metric, buckets) in &self.buckets {
            builder = builder.set_buckets_for_metric(Matcher::Full(metric.clone()), buckets)?;
        }
        for (key, value) in &self.global_labels {
            builder = builder.add_global_label(key.clone(), value.clone());
        }
        Ok(builder)
    }
}

/// Recorder that defers building the exporter until first use.
struct LazyExporter {
    pending: Mutex<Pending>,
    recorder: OnceLock<PrometheusRecorder>,
}

impl LazyExporter {
    fn new() -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            recorder: OnceLock::new(),
        }
    }

    fn recorder(&self) -> &PrometheusRecorder {
        self.recorder.get_or_init(|| {
            let mut pending = self.pending.lock();
            pending.sealed = true;

            let recorder = match pending.builder() {
                Ok(builder) => builder.build_recorder(),
                Err(e) => {
                    tracing::error!(error = %e, "Exporter rejected metric configuration, using defaults");
                    PrometheusBuilder::new().build_recorder()
                }
            };

            tracing::debug!(
                histograms = pending.buckets.len(),
                global_labels = pending.global_labels.len(),
                "Prometheus exporter sealed"
            );

            for description in pending.descriptions.drain(..) {
                description.apply(&recorder);
            }
            recorder
        })
    }

    /// Apply `change` to the pending configuration, failing once sealed.
    /// The resulting configuration is tried against the exporter so
    /// rejections surface here rather than at seal time.
    fn configure(&self, target: &str, change: impl FnOnce(&mut Pending)) -> Result<(), MetricError> {
        let mut pending = self.pending.lock();
        if pending.sealed {
            return Err(MetricError::Sealed {
                metric: target.to_string(),
            });
        }

        let mut next = Pending {
            buckets: pending.buckets.clone(),
            quantiles: pending.quantiles.clone(),
            global_labels: pending.global_labels.clone(),
            descriptions: Vec::new(),
            sealed: false,
        };
        change(&mut next);
        next.builder()
            .map_err(|e| MetricError::Exporter(e.to_string()))?;

        pending.buckets = next.buckets;
        pending.quantiles = next.quantiles;
        pending.global_labels = next.global_labels;
        Ok(())
    }

    fn describe(&self, description: Description) {
        {
            let mut pending = self.pending.lock();
            if !pending.sealed {
                pending.descriptions.push(description);
                return;
            }
        }
        description.apply(self.recorder());
    }
}

impl Recorder for LazyExporter {
    fn describe_counter(&self, key: KeyName, unit: Option<Unit>, help: SharedString) {
        self.describe(Description {
            kind: DescribeKind::Counter,
            key,
            unit,
            help,
        });
    }

    fn describe_gauge(&self, key: KeyName, unit: Option<Unit>, help: SharedString) {
        self.describe(Description {
            kind: DescribeKind::Gauge,
            key,
            unit,
            help,
        });
    }

    fn describe_histogram(&self, key: KeyName, unit: Option<Unit>, help: SharedString) {
        self.describe(Description {
            kind: DescribeKind::Histogram,
            key,
            unit,
            help,
        });
    }

    fn register_counter(&self, key: &Key, metadata: &Metadata<'_>) -> Counter {
        self.recorder().register_counter(key, metadata)
    }

    fn register_gauge(&self, key: &Key, metadata: &Metadata<'_>) -> Gauge {
        self.recorder().register_gauge(key, metadata)
    }

    fn register_histogram(&self, key: &Key, metadata: &Metadata<'_>) -> Histogram {
        self.recorder().register_histogram(key, metadata)
    }
}

/// Sink exporting in the Prometheus text format.
///
/// Histogram buckets are set per metric name. Summary quantiles are global
/// to the exporter, so only one quantile set may be configured; epsilons
/// are validated but the exporter's sketch does not take them.
#[derive(Clone)]
pub struct PrometheusSink {
    exporter: Arc<LazyExporter>,
    sink: RecorderSink,
}

impl PrometheusSink {
    pub fn new() -> Self {
        let exporter = Arc::new(LazyExporter::new());
        let sink = RecorderSink::new(exporter.clone());
        Self { exporter, sink }
    }

    /// Label attached to every exported series, e.g. `app` or `env`.
    pub fn add_global_label(&self, key: &str, value: &str) -> Result<(), MetricError> {
        let target = format!("global label {key}");
        let label = (key.to_string(), value.to_string());
        self.exporter
            .configure(&target, |pending| pending.global_labels.push(label))
    }

    /// Seals the configuration and returns a handle for rendering.
    pub fn handle(&self) -> PrometheusHandle {
        self.exporter.recorder().handle()
    }

    pub fn render(&self) -> String {
        self.handle().render()
    }

    pub fn is_sealed(&self) -> bool {
        self.exporter.recorder.get().is_some()
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSink for PrometheusSink {
    fn counter(
        &self,
        descriptor: &MetricDescriptor,
        config: &MetricConfig,
    ) -> Result<CounterFamily, MetricError> {
        self.sink.counter(descriptor, config)
    }

    fn gauge(
        &self,
        descriptor: &MetricDescriptor,
        config: &MetricConfig,
    ) -> Result<GaugeFamily, MetricError> {
        self.sink.gauge(descriptor, config)
    }

    fn histogram(
        &self,
        descriptor: &MetricDescriptor,
        config: &HistogramConfig,
    ) -> Result<HistogramFamily, MetricError> {
        check_labels(descriptor, &config.label_names)?;
        check_buckets(&descriptor.name, &config.buckets)?;
        self.sink.check_claim(&descriptor.name, MetricKind::Histogram)?;

        let metric = descriptor.name.clone();
        let buckets = config.buckets.clone();
        self.exporter.configure(&descriptor.name, |pending| {
            pending.buckets.retain(|(name, _)| *name != metric);
            pending.buckets.push((metric, buckets));
        })?;
        self.sink.histogram(descriptor, config)
    }

    fn summary(
        &self,
        descriptor: &MetricDescriptor,
        config: &SummaryConfig,
    ) -> Result<HistogramFamily, MetricError> {
        check_labels(descriptor, &config.label_names)?;
        check_objectives(&descriptor.name, &config.objectives)?;
        self.sink.check_claim(&descriptor.name, MetricKind::Summary)?;

        let quantiles: Vec<f64> = config.objectives.iter().map(|o| o.quantile).collect();
        let mut conflict = false;
        self.exporter.configure(&descriptor.name, |pending| {
            match &pending.quantiles {
                Some(existing) if *existing != quantiles => conflict = true,
                _ => pending.quantiles = Some(quantiles),
            }
        })?;
        if conflict {
            return Err(MetricError::Exporter(format!(
                "summary {} needs a different quantile set than one already configured",
                descriptor.name
            )));
        }
        self.sink.summary(descriptor, config)
    }
}

impl fmt::Debug for PrometheusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusSink")
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
