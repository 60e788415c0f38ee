//! Per-request correlation scope.
//!
//! Lifecycle events for one request may be handled on different threads;
//! the [`RequestContext`] travelling with the events is the only thing tying
//! them together.

use axum::http::Method;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::events::{Field, Reflect};
use crate::http::state::Items;

/// Metadata of the endpoint a request was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    /// Declared logical name, e.g. `get_status`.
    pub name: Option<String>,
    /// Route template, e.g. `/demo/status/{code}`.
    pub route_template: Option<String>,
}

impl Endpoint {
    pub fn named(name: impl Into<String>, route_template: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            route_template: Some(route_template.into()),
        }
    }

    pub fn unnamed(route_template: impl Into<String>) -> Self {
        Self {
            name: None,
            route_template: Some(route_template.into()),
        }
    }
}

pub struct RequestContext {
    id: Uuid,
    method: Method,
    path: String,
    status: AtomicU16,
    endpoint: OnceLock<Endpoint>,
    items: Items,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            status: AtomicU16::new(200),
            endpoint: OnceLock::new(),
            items: Items::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Response status; 200 until the response is known.
    pub fn status(&self) -> u16 {
        self.status.load(Ordering::Acquire)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::Release);
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.get()
    }

    /// Returns false if an endpoint was already set.
    pub fn set_endpoint(&self, endpoint: Endpoint) -> bool {
        self.endpoint.set(endpoint).is_ok()
    }

    pub fn items(&self) -> &Items {
        &self.items
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("status", &self.status())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

fn context_path(payload: &dyn Any) -> Option<&dyn Any> {
    payload
        .downcast_ref::<RequestContext>()
        .map(|c| &c.path as &dyn Any)
}

fn context_method(payload: &dyn Any) -> Option<&dyn Any> {
    payload
        .downcast_ref::<RequestContext>()
        .map(|c| &c.method as &dyn Any)
}

static CONTEXT_FIELDS: &[Field] = &[
    Field::new("path", context_path),
    Field::new("method", context_method),
];

impl Reflect for RequestContext {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn fields(&self) -> &'static [Field] {
        CONTEXT_FIELDS
    }
}
