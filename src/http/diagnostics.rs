//! Request lifecycle events for axum.
//!
//! [`diagnostics_middleware`] publishes on an [`EventSource`] named
//! [`SOURCE_NAME`]:
//!
//! | event | payload |
//! |---|---|
//! | [`REQUEST_START`] | [`RequestContext`] |
//! | [`ENDPOINT_MATCHED`] | [`RequestContext`] |
//! | [`UNHANDLED_EXCEPTION`] | [`UnhandledExceptionPayload`] |
//! | [`REQUEST_STOP`] | [`RequestContext`] |
//!
//! The names are a compatibility contract with observers in other crates.

use axum::{
    extract::{MatchedPath, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::events::{EventSource, Field, Reflect};
use crate::http::context::{Endpoint, RequestContext};
use crate::http::sli::{ErrorKind, SliError};

pub const SOURCE_NAME: &str = "sli.http.server";
pub const REQUEST_START: &str = "sli.http.server.request.start";
pub const ENDPOINT_MATCHED: &str = "sli.http.server.routing.endpoint_matched";
pub const UNHANDLED_EXCEPTION: &str = "sli.http.server.diagnostics.unhandled_exception";
pub const REQUEST_STOP: &str = "sli.http.server.request.stop";

/// Every lifecycle event name, in the order a request emits them.
pub const LIFECYCLE_EVENTS: [&str; 4] = [
    REQUEST_START,
    ENDPOINT_MATCHED,
    UNHANDLED_EXCEPTION,
    REQUEST_STOP,
];

/// Payload of [`UNHANDLED_EXCEPTION`]. Fields: `http_context`, `exception`.
pub struct UnhandledExceptionPayload {
    pub http_context: Arc<RequestContext>,
    pub exception: Arc<dyn Error + Send + Sync>,
}

fn payload_http_context(payload: &dyn Any) -> Option<&dyn Any> {
    payload
        .downcast_ref::<UnhandledExceptionPayload>()
        .map(|p| &p.http_context as &dyn Any)
}

fn payload_exception(payload: &dyn Any) -> Option<&dyn Any> {
    payload
        .downcast_ref::<UnhandledExceptionPayload>()
        .map(|p| &p.exception as &dyn Any)
}

static EXCEPTION_FIELDS: &[Field] = &[
    Field::new("http_context", payload_http_context),
    Field::new("exception", payload_exception),
];

impl Reflect for UnhandledExceptionPayload {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn fields(&self) -> &'static [Field] {
        EXCEPTION_FIELDS
    }
}

/// Logical endpoint names keyed by method and route template.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    names: HashMap<(Method, String), String>,
}

impl EndpointCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: Method, route_template: &str, name: &str) -> Self {
        self.names
            .insert((method, route_template.to_string()), name.to_string());
        self
    }

    pub fn resolve(&self, method: &Method, route_template: &str) -> Endpoint {
        match self.names.get(&(method.clone(), route_template.to_string())) {
            Some(name) => Endpoint::named(name.clone(), route_template),
            None => Endpoint::unnamed(route_template),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An error that escaped a handler.
///
/// Returning it from a handler produces a 500 response (400 for an
/// [`SliError`] of kind [`ErrorKind::InvalidRequest`]) and reports the error
/// through [`UNHANDLED_EXCEPTION`].
#[derive(Clone)]
pub struct UnhandledError(pub Arc<dyn Error + Send + Sync>);

impl UnhandledError {
    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl<E> From<E> for UnhandledError
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Debug for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnhandledError")
            .field(&self.0.to_string())
            .finish()
    }
}

impl IntoResponse for UnhandledError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<SliError>() {
            Some(error) if error.kind == ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (status, self.0.to_string()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[derive(Clone)]
pub struct DiagnosticsState {
    pub source: Arc<EventSource>,
    pub endpoints: Arc<EndpointCatalog>,
}

impl DiagnosticsState {
    pub fn new(source: Arc<EventSource>, endpoints: EndpointCatalog) -> Self {
        Self {
            source,
            endpoints: Arc::new(endpoints),
        }
    }
}

/// Status recorded for a request whose response future was dropped before
/// completing, e.g. because the client went away.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Publishes [`REQUEST_STOP`] exactly once per request, including when the
/// middleware future is dropped mid-flight.
struct StopGuard {
    source: Arc<EventSource>,
    context: Arc<RequestContext>,
    stopped: bool,
}

impl StopGuard {
    fn new(source: Arc<EventSource>, context: Arc<RequestContext>) -> Self {
        Self {
            source,
            context,
            stopped: false,
        }
    }

    fn stop(&mut self, status: u16) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.context.set_status(status);
        if self.source.is_enabled(REQUEST_STOP) {
            self.source.write(REQUEST_STOP, Some(&*self.context));
        }
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        if !self.stopped {
            tracing::debug!(
                request_id = %self.context.id(),
                path = %self.context.path(),
                "Request dropped before completion"
            );
            self.stop(CLIENT_CLOSED_REQUEST);
        }
    }
}

/// Creates the request's [`RequestContext`] (available to handlers as an
/// `Extension<Arc<RequestContext>>`) and publishes its lifecycle events.
///
/// [`REQUEST_STOP`] is published even when the request future is dropped;
/// the context then carries [`CLIENT_CLOSED_REQUEST`] as its status.
pub async fn diagnostics_middleware(
    State(state): State<DiagnosticsState>,
    mut request: Request,
    next: Next,
) -> Response {
    let source = &state.source;
    let context = Arc::new(RequestContext::new(
        request.method().clone(),
        request.uri().path(),
    ));
    request.extensions_mut().insert(context.clone());

    if source.is_enabled(REQUEST_START) {
        source.write(REQUEST_START, Some(&*context));
    }
    let mut guard = StopGuard::new(source.clone(), context.clone());

    if let Some(matched) = request.extensions().get::<MatchedPath>() {
        context.set_endpoint(state.endpoints.resolve(context.method(), matched.as_str()));
        if source.is_enabled(ENDPOINT_MATCHED) {
            source.write(ENDPOINT_MATCHED, Some(&*context));
        }
    }

    let response = next.run(request).await;

    if let Some(unhandled) = response.extensions().get::<UnhandledError>() {
        tracing::debug!(
            request_id = %context.id(),
            error = %unhandled.0,
            "Handler returned an unhandled error"
        );
        if source.is_enabled(UNHANDLED_EXCEPTION) {
            let payload = UnhandledExceptionPayload {
                http_context: context.clone(),
                exception: unhandled.0.clone(),
            };
            source.write(UNHANDLED_EXCEPTION, Some(&payload));
        }
    }

    guard.stop(response.status().as_u16());
    response
}
