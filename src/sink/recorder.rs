//! Sink over any `metrics::Recorder`.

use metrics::{Key, KeyName, Level, Metadata, Recorder, SharedString};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::MetricError;
use crate::sink::{
    check_buckets, check_labels, check_objectives, CounterFamily, Family, GaugeFamily,
    HistogramConfig, HistogramFamily, MetricConfig, MetricDescriptor, MetricSink, SummaryConfig,
};

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

type SharedRecorder = Arc<dyn Recorder + Send + Sync>;

/// Registers families directly on an injected recorder.
///
/// Buckets and objectives are validated but otherwise left to the recorder;
/// use [`PrometheusSink`](crate::sink::PrometheusSink) to have them exported.
#[derive(Clone)]
pub struct RecorderSink {
    recorder: SharedRecorder,
    kinds: Arc<Mutex<HashMap<String, MetricKind>>>,
}

impl RecorderSink {
    pub fn new(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Self {
            recorder,
            kinds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A name registers as one kind only. Registering the same kind again
    /// hands out another family over the same series.
    pub(crate) fn claim(&self, name: &str, kind: MetricKind) -> Result<(), MetricError> {
        let mut kinds = self.kinds.lock();
        Self::check_kind(&kinds, name, kind)?;
        kinds.entry(name.to_string()).or_insert(kind);
        Ok(())
    }

    /// Whether `name` could be claimed as `kind`, without claiming it.
    pub(crate) fn check_claim(&self, name: &str, kind: MetricKind) -> Result<(), MetricError> {
        Self::check_kind(&self.kinds.lock(), name, kind)
    }

    fn check_kind(
        kinds: &HashMap<String, MetricKind>,
        name: &str,
        kind: MetricKind,
    ) -> Result<(), MetricError> {
        match kinds.get(name) {
            Some(existing) if *existing != kind => Err(MetricError::KindConflict {
                metric: name.to_string(),
                existing: existing.as_str(),
            }),
            _ => Ok(()),
        }
    }

    fn describe(&self, descriptor: &MetricDescriptor, kind: MetricKind) {
        let key = KeyName::from(descriptor.name.clone());
        let help = SharedString::from(descriptor.help.clone());
        match kind {
            MetricKind::Counter => self.recorder.describe_counter(key, descriptor.unit, help),
            MetricKind::Gauge => self.recorder.describe_gauge(key, descriptor.unit, help),
            MetricKind::Histogram | MetricKind::Summary => {
                self.recorder.describe_histogram(key, descriptor.unit, help)
            }
        }
    }

    pub(crate) fn histogram_family(
        &self,
        descriptor: &MetricDescriptor,
        kind: MetricKind,
    ) -> Result<HistogramFamily, MetricError> {
        self.claim(&descriptor.name, kind)?;
        self.describe(descriptor, kind);

        let recorder = self.recorder.clone();
        Ok(Family::new(
            descriptor.name.clone(),
            descriptor.label_names.clone(),
            move |key: &Key| recorder.register_histogram(key, &METADATA),
        ))
    }
}

impl MetricSink for RecorderSink {
    fn counter(
        &self,
        descriptor: &MetricDescriptor,
        config: &MetricConfig,
    ) -> Result<CounterFamily, MetricError> {
        check_labels(descriptor, &config.label_names)?;
        self.claim(&descriptor.name, MetricKind::Counter)?;
        self.describe(descriptor, MetricKind::Counter);

        let recorder = self.recorder.clone();
        Ok(Family::new(
            descriptor.name.clone(),
            descriptor.label_names.clone(),
            move |key: &Key| recorder.register_counter(key, &METADATA),
        ))
    }

    fn gauge(
        &self,
        descriptor: &MetricDescriptor,
        config: &MetricConfig,
    ) -> Result<GaugeFamily, MetricError> {
        check_labels(descriptor, &config.label_names)?;
        self.claim(&descriptor.name, MetricKind::Gauge)?;
        self.describe(descriptor, MetricKind::Gauge);

        let recorder = self.recorder.clone();
        Ok(Family::new(
            descriptor.name.clone(),
            descriptor.label_names.clone(),
            move |key: &Key| recorder.register_gauge(key, &METADATA),
        ))
    }

    fn histogram(
        &self,
        descriptor: &MetricDescriptor,
        config: &HistogramConfig,
    ) -> Result<HistogramFamily, MetricError> {
        check_labels(descriptor, &config.label_names)?;
        check_buckets(&descriptor.name, &config.buckets)?;
        self.histogram_family(descriptor, MetricKind::Histogram)
    }

    fn summary(
        &self,
        descriptor: &MetricDescriptor,
        config: &SummaryConfig,
    ) -> Result<HistogramFamily, MetricError> {
        check_labels(descriptor, &config.label_names)?;
        check_objectives(&descriptor.name, &config.objectives)?;
        self.histogram_family(descriptor, MetricKind::Summary)
    }
}

impl fmt::Debug for RecorderSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderSink")
            .field("metrics", &self.kinds.lock().len())
            .finish()
    }
}
