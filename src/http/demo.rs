//! Demo endpoints exercising each SLI outcome.
//!
//! ```text
//! GET /demo/status/200
//! GET /demo/error?errorType=ExternalDependency&dependency=ob-uk
//! GET /demo/exception
//! GET /demo/sliex
//! ```

use axum::{
    extract::{Path, Query},
    http::{Method, StatusCode},
    Extension,
};
use serde::Deserialize;
use std::io;
use std::sync::Arc;

use crate::http::context::RequestContext;
use crate::http::diagnostics::{EndpointCatalog, UnhandledError};
use crate::http::sli::{ErrorKind, SliError};

pub const STATUS_ROUTE: &str = "/demo/status/{code}";
pub const ERROR_ROUTE: &str = "/demo/error";
pub const EXCEPTION_ROUTE: &str = "/demo/exception";
pub const SLI_EXCEPTION_ROUTE: &str = "/demo/sliex";

/// Logical names of the demo endpoints.
pub fn endpoints() -> EndpointCatalog {
    EndpointCatalog::new()
        .with(Method::GET, STATUS_ROUTE, "get_status")
        .with(Method::GET, ERROR_ROUTE, "get_error")
        .with(Method::GET, EXCEPTION_ROUTE, "get_exception")
        .with(Method::GET, SLI_EXCEPTION_ROUTE, "get_sliex")
}

/// Responds with the requested status code.
pub async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[derive(Debug, Deserialize)]
pub struct ErrorQuery {
    #[serde(rename = "errorType")]
    pub error_type: Option<ErrorKind>,
    pub dependency: Option<String>,
}

/// Fails with 500, classified by the query when `errorType` is given.
pub async fn error(
    Extension(context): Extension<Arc<RequestContext>>,
    Query(query): Query<ErrorQuery>,
) -> StatusCode {
    if let Some(kind) = query.error_type {
        context.set_sli_error(kind, query.dependency.as_deref());
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn exception() -> Result<StatusCode, UnhandledError> {
    Err(io::Error::new(io::ErrorKind::Other, "Invalid request").into())
}

pub async fn sli_exception() -> Result<StatusCode, UnhandledError> {
    Err(SliError::with_dependency(ErrorKind::ExternalDependency, "sliex_dependency").into())
}
