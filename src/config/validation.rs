//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buckets increasing, quantiles in range)
//! - Check listener settings parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    let metrics = &config.metrics;

    for (i, path) in metrics.exclude_paths.iter().enumerate() {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("metrics.exclude_paths[{i}]"),
                format!("'{path}' must start with '/'"),
            ));
        }
    }

    let buckets = &metrics.histogram_buckets;
    if buckets.is_empty() {
        errors.push(ValidationError::new("metrics.histogram_buckets", "must not be empty"));
    } else if buckets.iter().any(|b| !b.is_finite()) {
        errors.push(ValidationError::new("metrics.histogram_buckets", "must be finite"));
    } else if buckets.windows(2).any(|w| w[0] >= w[1]) {
        errors.push(ValidationError::new(
            "metrics.histogram_buckets",
            "must be strictly increasing",
        ));
    }

    for (i, objective) in metrics.summary_objectives.iter().enumerate() {
        if !(objective.quantile > 0.0 && objective.quantile <= 1.0) {
            errors.push(ValidationError::new(
                format!("metrics.summary_objectives[{i}].quantile"),
                format!("{} is outside (0, 1]", objective.quantile),
            ));
        }
        if !(0.0..1.0).contains(&objective.epsilon) {
            errors.push(ValidationError::new(
                format!("metrics.summary_objectives[{i}].epsilon"),
                format!("{} is outside [0, 1)", objective.epsilon),
            ));
        }
    }

    for name in metrics.global_labels.keys() {
        if name.is_empty() || name.starts_with("__") {
            errors.push(ValidationError::new(
                "metrics.global_labels",
                format!("'{name}' is not a usable label name"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Objective;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.metrics.exclude_paths = vec!["metrics".to_string()];
        config.metrics.histogram_buckets = vec![1.0, 0.5];
        config.metrics.summary_objectives = vec![Objective::new(0.0, 1.0)];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "metrics.exclude_paths[0]",
                "metrics.histogram_buckets",
                "metrics.summary_objectives[0].quantile",
                "metrics.summary_objectives[0].epsilon",
            ]
        );
    }

    #[test]
    fn test_empty_buckets_rejected() {
        let mut config = AppConfig::default();
        config.metrics.histogram_buckets.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "metrics.histogram_buckets: must not be empty");
    }
}
