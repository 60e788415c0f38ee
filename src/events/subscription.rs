//! Revocable subscription handles.

use parking_lot::{Mutex, RwLock};
use std::fmt;

type Cancel = Box<dyn FnOnce() + Send>;

/// Handle to an active subscription.
///
/// Dropping the handle unsubscribes. [`Subscription::unsubscribe`] may be
/// called any number of times from any thread; only the first call does
/// anything.
pub struct Subscription {
    cancel: Mutex<Option<Cancel>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Revoke the subscription. Once this returns no new callback on the
    /// subscribed observer will start.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Guards callbacks into one subscriber.
///
/// Deliveries hold a shared lock for the duration of the callback, closing
/// takes the exclusive lock. Closing therefore waits for in-flight callbacks
/// and no callback starts afterwards. A callback must not close its own gate.
pub(crate) struct Gate {
    open: RwLock<bool>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            open: RwLock::new(true),
        }
    }

    /// Run `f` if the gate is still open. Returns whether it ran.
    pub(crate) fn pass(&self, f: impl FnOnce()) -> bool {
        // Recursive read: a callback may publish to the same subscriber
        // while a closer is queued.
        let open = self.open.read_recursive();
        if *open {
            f();
        }
        *open
    }

    pub(crate) fn close(&self) {
        *self.open.write() = false;
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.read_recursive()
    }
}
