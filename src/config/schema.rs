//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sink::Objective;

/// Root configuration for the instrumented service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// SLI metric settings.
    pub metrics: MetricsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sli_metrics=info,tower_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Which metric type records request durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurationMetricType {
    #[default]
    Histogram,
    Summary,
}

/// SLI metric settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Request paths left uninstrumented, matched by whole segments.
    pub exclude_paths: Vec<String>,

    pub duration_metric_type: DurationMetricType,

    /// Bucket upper bounds in seconds for the duration histogram.
    pub histogram_buckets: Vec<f64>,

    /// Quantile/epsilon pairs for the duration summary.
    pub summary_objectives: Vec<Objective>,

    /// Labels added to every exported series.
    pub global_labels: BTreeMap<String, String>,
}

pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 5] = [0.1, 0.2, 0.5, 1.0, 2.0];

pub const DEFAULT_SUMMARY_OBJECTIVES: [Objective; 4] = [
    Objective::new(0.5, 0.05),
    Objective::new(0.9, 0.05),
    Objective::new(0.95, 0.01),
    Objective::new(0.99, 0.005),
];

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            exclude_paths: vec!["/metrics".to_string()],
            duration_metric_type: DurationMetricType::Histogram,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
            summary_objectives: DEFAULT_SUMMARY_OBJECTIVES.to_vec(),
            global_labels: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.metrics.exclude_paths, vec!["/metrics"]);
        assert_eq!(config.metrics.duration_metric_type, DurationMetricType::Histogram);
        assert_eq!(config.metrics.histogram_buckets, vec![0.1, 0.2, 0.5, 1.0, 2.0]);
        assert_eq!(config.metrics.summary_objectives.len(), 4);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_metrics_section() {
        let config: AppConfig = toml::from_str(
            r#"
            [logging]
            format = "json"

            [metrics]
            duration_metric_type = "summary"
            summary_objectives = [{ quantile = 0.5, epsilon = 0.05 }]

            [metrics.global_labels]
            app = "demo"
            env = "local"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.metrics.duration_metric_type, DurationMetricType::Summary);
        assert_eq!(config.metrics.summary_objectives, vec![Objective::new(0.5, 0.05)]);
        assert_eq!(config.metrics.global_labels.get("app").map(String::as_str), Some("demo"));
        // Unset fields keep their defaults.
        assert_eq!(config.metrics.exclude_paths, vec!["/metrics"]);
    }
}
