//! Typed view of the request lifecycle events.

use std::error::Error;
use std::sync::Arc;

use crate::events::{EventObserver, FieldFetcher, Reflect};
use crate::http::context::RequestContext;
use crate::http::diagnostics::{ENDPOINT_MATCHED, REQUEST_START, REQUEST_STOP, UNHANDLED_EXCEPTION};

/// Callbacks for the stages of a request. Every stage defaults to a no-op.
pub trait HttpObserver: Send + Sync {
    fn on_request_started(&self, _context: &RequestContext) {}

    fn on_endpoint_matched(&self, _context: &RequestContext) {}

    fn on_unhandled_exception(
        &self,
        _context: &RequestContext,
        _error: &(dyn Error + Send + Sync + 'static),
    ) {
    }

    fn on_request_completed(&self, _context: &RequestContext) {}
}

/// Adapts an [`HttpObserver`] to the untyped event stream.
///
/// Unknown events and payloads of an unexpected shape are ignored.
pub struct HttpEventDispatcher<O> {
    observer: O,
    contexts: FieldFetcher<Arc<RequestContext>>,
    exceptions: FieldFetcher<Arc<dyn Error + Send + Sync>>,
}

impl<O: HttpObserver> HttpEventDispatcher<O> {
    pub fn new(observer: O) -> Self {
        Self {
            observer,
            contexts: FieldFetcher::new("httpContext"),
            exceptions: FieldFetcher::new("exception"),
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    fn context<'a>(event: &str, payload: Option<&'a dyn Reflect>) -> Option<&'a RequestContext> {
        let context = payload?.as_any().downcast_ref::<RequestContext>();
        if context.is_none() {
            tracing::trace!(event, "Skipping event without a request context");
        }
        context
    }

    fn unhandled_exception(&self, payload: Option<&dyn Reflect>) {
        let context = self.contexts.try_fetch(payload);
        let exception = self.exceptions.try_fetch(payload);
        match (context, exception) {
            (Some(context), Some(exception)) => {
                self.observer.on_unhandled_exception(context, &**exception)
            }
            _ => tracing::trace!("Skipping malformed unhandled exception event"),
        }
    }
}

impl<O: HttpObserver> EventObserver for HttpEventDispatcher<O> {
    fn on_next(&self, event: &str, payload: Option<&dyn Reflect>) {
        match event {
            REQUEST_START => {
                if let Some(context) = Self::context(event, payload) {
                    self.observer.on_request_started(context);
                }
            }
            ENDPOINT_MATCHED => {
                if let Some(context) = Self::context(event, payload) {
                    self.observer.on_endpoint_matched(context);
                }
            }
            UNHANDLED_EXCEPTION => self.unhandled_exception(payload),
            REQUEST_STOP => {
                if let Some(context) = Self::context(event, payload) {
                    self.observer.on_request_completed(context);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::diagnostics::UnhandledExceptionPayload;
    use crate::http::sli::{ErrorKind, SliError};
    use axum::http::Method;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Stages {
        seen: Mutex<Vec<String>>,
    }

    impl HttpObserver for Stages {
        fn on_request_started(&self, context: &RequestContext) {
            self.seen.lock().push(format!("start {}", context.path()));
        }

        fn on_endpoint_matched(&self, _context: &RequestContext) {
            self.seen.lock().push("matched".to_string());
        }

        fn on_unhandled_exception(
            &self,
            _context: &RequestContext,
            error: &(dyn Error + Send + Sync + 'static),
        ) {
            self.seen.lock().push(format!("exception {error}"));
        }

        fn on_request_completed(&self, context: &RequestContext) {
            self.seen.lock().push(format!("stop {}", context.status()));
        }
    }

    #[test]
    fn test_dispatches_lifecycle() {
        let dispatcher = HttpEventDispatcher::new(Stages::default());
        let context = Arc::new(RequestContext::new(Method::GET, "/demo/sliex"));
        let payload = UnhandledExceptionPayload {
            http_context: context.clone(),
            exception: Arc::new(SliError::new(ErrorKind::Internal)),
        };

        dispatcher.on_next(REQUEST_START, Some(&*context));
        dispatcher.on_next(ENDPOINT_MATCHED, Some(&*context));
        dispatcher.on_next(UNHANDLED_EXCEPTION, Some(&payload));
        context.set_status(500);
        dispatcher.on_next(REQUEST_STOP, Some(&*context));

        assert_eq!(
            *dispatcher.observer().seen.lock(),
            vec![
                "start /demo/sliex",
                "matched",
                "exception internal error",
                "stop 500"
            ]
        );
    }

    #[test]
    fn test_ignores_foreign_events_and_payloads() {
        struct Foreign;
        impl Reflect for Foreign {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let dispatcher = HttpEventDispatcher::new(Stages::default());
        dispatcher.on_next("other.event", Some(&Foreign));
        dispatcher.on_next(REQUEST_START, Some(&Foreign));
        dispatcher.on_next(REQUEST_STOP, None);
        dispatcher.on_next(UNHANDLED_EXCEPTION, Some(&Foreign));

        assert!(dispatcher.observer().seen.lock().is_empty());
    }
}
