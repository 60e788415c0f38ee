//! Error classification.

use crate::http::sli::{ErrorKind, SliError};

/// Classify a completed request.
///
/// An explicit classification is returned verbatim. Otherwise 4xx counts as
/// an invalid request and 5xx as an internal error; anything else is not an
/// error.
pub fn classify(explicit: Option<SliError>, status: u16) -> Option<SliError> {
    if explicit.is_some() {
        return explicit;
    }

    match status {
        400..=499 => Some(SliError::new(ErrorKind::InvalidRequest)),
        500.. => Some(SliError::new(ErrorKind::Internal)),
        _ => None,
    }
}
