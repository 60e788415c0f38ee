//! Dynamically shaped event payloads.
//!
//! Producers publish any type implementing [`Reflect`]; consumers pull named
//! fields out with a [`FieldFetcher`] without knowing the concrete type.

use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// Extracts one field from a payload of a known concrete type.
pub type FieldGetter = fn(&dyn Any) -> Option<&dyn Any>;

/// A named field exposed by a payload shape.
#[derive(Clone, Copy)]
pub struct Field {
    name: &'static str,
    get: FieldGetter,
}

impl Field {
    /// Declare a field. `get` receives the payload as `&dyn Any` and must
    /// downcast it to the declaring type.
    pub const fn new(name: &'static str, get: FieldGetter) -> Self {
        Self { name, get }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// A value that can travel as an event payload.
pub trait Reflect: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Fields other components may fetch by name.
    fn fields(&self) -> &'static [Field] {
        &[]
    }
}

/// Fetches a field of type `T` by name from arbitrary payloads.
///
/// The field lookup is resolved once per payload type and cached, so
/// repeated fetches from the same shape only pay for a map lookup and a
/// downcast. Absent payloads, unknown fields and type mismatches all yield
/// `None`.
pub struct FieldFetcher<T> {
    name: String,
    cache: DashMap<TypeId, Option<FieldGetter>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> FieldFetcher<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache: DashMap::new(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn try_fetch<'a>(&self, payload: Option<&'a dyn Reflect>) -> Option<&'a T> {
        let payload = payload?;
        let target = payload.as_any();
        let shape = Any::type_id(target);

        // Copy out of the map before inserting; holding the ref would
        // deadlock on the shard lock.
        let cached = self.cache.get(&shape).map(|entry| *entry);
        let getter = match cached {
            Some(getter) => getter,
            None => {
                let resolved = payload
                    .fields()
                    .iter()
                    .find(|field| field_name_eq(field.name, &self.name))
                    .map(|field| field.get);
                self.cache.insert(shape, resolved);
                resolved
            }
        };

        getter?(target)?.downcast_ref::<T>()
    }

    /// Number of payload shapes resolved so far.
    pub fn cached_shapes(&self) -> usize {
        self.cache.len()
    }
}

impl<T> fmt::Debug for FieldFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldFetcher")
            .field("name", &self.name)
            .field("cached_shapes", &self.cache.len())
            .finish()
    }
}

/// Field names compare ASCII case-insensitively with `_` ignored, so
/// `httpContext` finds `http_context`.
fn field_name_eq(declared: &str, requested: &str) -> bool {
    normalized(declared).eq(normalized(requested))
}

fn normalized(name: &str) -> impl Iterator<Item = char> + '_ {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
}
