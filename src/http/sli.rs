//! SLI error kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a request counts against the error budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[serde(alias = "InvalidRequest")]
    InvalidRequest,
    #[serde(alias = "Internal")]
    Internal,
    #[serde(alias = "ExternalDependency")]
    ExternalDependency,
    #[serde(alias = "InternalDependency")]
    InternalDependency,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 4] = [
        ErrorKind::InvalidRequest,
        ErrorKind::Internal,
        ErrorKind::ExternalDependency,
        ErrorKind::InternalDependency,
    ];

    /// Label value exported as `sli_error_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
            ErrorKind::ExternalDependency => "external_dependency",
            ErrorKind::InternalDependency => "internal_dependency",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown SLI error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    /// Accepts the label form (`external_dependency`) as well as the
    /// variant name (`ExternalDependency`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == folded)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

/// An error classified for SLI purposes.
///
/// Handlers may return it (wrapped in
/// [`UnhandledError`](crate::http::diagnostics::UnhandledError)) so the
/// failure is counted under `kind` and `dependency`, whatever status the
/// response ends up with. It is also what classification of a completed
/// request yields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error{}", in_dependency(.dependency))]
pub struct SliError {
    pub kind: ErrorKind,
    pub dependency: Option<String>,
}

fn in_dependency(dependency: &Option<String>) -> String {
    dependency
        .as_deref()
        .map(|d| format!(" in {d}"))
        .unwrap_or_default()
}

impl SliError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            dependency: None,
        }
    }

    pub fn with_dependency(kind: ErrorKind, dependency: impl Into<String>) -> Self {
        Self {
            kind,
            dependency: Some(dependency.into()),
        }
    }

    /// Empty when no dependency is known, so the label is always present.
    pub fn dependency_label(&self) -> &str {
        self.dependency.as_deref().unwrap_or("")
    }
}
