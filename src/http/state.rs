//! Request state store.
//!
//! A typed key/value bag on [`RequestContext`] plus the SLI entries kept in
//! it. Entries are write-once except the operation name, which application
//! code may overwrite explicitly.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use crate::http::context::RequestContext;
use crate::http::sli::{ErrorKind, SliError};

/// Typed key into [`Items`].
pub struct ItemKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ItemKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ItemKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ItemKey<T> {}

impl<T> fmt::Debug for ItemKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ItemKey").field(&self.name).finish()
    }
}

/// Key/value bag scoped to one request.
///
/// A value stored under a key with a different type reads as absent.
#[derive(Default)]
pub struct Items {
    entries: Mutex<HashMap<&'static str, Box<dyn Any + Send + Sync>>>,
}

impl Items {
    pub fn get<T>(&self, key: ItemKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries
            .lock()
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T: 'static>(&self, key: ItemKey<T>) -> bool {
        self.entries
            .lock()
            .get(key.name)
            .is_some_and(|value| value.is::<T>())
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: ItemKey<T>, value: T) {
        self.entries.lock().insert(key.name, Box::new(value));
    }

    /// Returns whether the value was stored.
    pub fn insert_if_absent<T: Send + Sync + 'static>(&self, key: ItemKey<T>, value: T) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(key.name).is_some_and(|existing| existing.is::<T>()) {
            return false;
        }
        entries.insert(key.name, Box::new(value));
        true
    }

    pub fn remove<T: 'static>(&self, key: ItemKey<T>) -> Option<T> {
        let mut entries = self.entries.lock();
        if !entries.get(key.name).is_some_and(|value| value.is::<T>()) {
            return None;
        }
        entries
            .remove(key.name)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for Items {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_set().entries(entries.keys()).finish()
    }
}

const OPERATION: ItemKey<String> = ItemKey::new("sli.operation");
const REQUEST_TIMESTAMP: ItemKey<Instant> = ItemKey::new("sli.request_timestamp");
const SLI_ERROR: ItemKey<SliError> = ItemKey::new("sli.error");

impl RequestContext {
    /// Name the operation explicitly. Overrides any earlier name.
    pub fn set_operation(&self, operation: impl Into<String>) {
        self.items().insert(OPERATION, operation.into());
    }

    pub fn operation(&self) -> Option<String> {
        self.items().get(OPERATION)
    }

    /// Store a derived operation name unless one is already present.
    pub(crate) fn set_derived_operation(&self, operation: &str) -> bool {
        self.items().insert_if_absent(OPERATION, operation.to_string())
    }

    /// First write wins.
    pub fn set_request_timestamp(&self, timestamp: Instant) -> bool {
        self.items().insert_if_absent(REQUEST_TIMESTAMP, timestamp)
    }

    pub fn request_timestamp(&self) -> Option<Instant> {
        self.items().get(REQUEST_TIMESTAMP)
    }

    /// Time since the request started, or zero when the start was never
    /// recorded.
    pub fn request_duration(&self, now: Instant) -> Duration {
        self.request_timestamp()
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Classify the request's failure explicitly. The first classification
    /// sticks; a blank dependency is treated as none.
    pub fn set_sli_error(&self, kind: ErrorKind, dependency: Option<&str>) -> bool {
        let dependency = dependency
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        self.items()
            .insert_if_absent(SLI_ERROR, SliError { kind, dependency })
    }

    pub fn sli_error(&self) -> Option<SliError> {
        self.items().get(SLI_ERROR)
    }
}
