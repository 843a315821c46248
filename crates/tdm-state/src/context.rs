//! Type-erased key → value storage backing [`State`](crate::State).
//!
//! Values are kept as `Arc<dyn Any + Send + Sync>` so tables, skims, size
//! term calculators and plain scalars can share one namespace.  Typed reads
//! go through [`downcast`].

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{StateError, StateResult};

/// A shared, type-erased context value.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Recover a typed `Arc<T>` from a context value.
pub fn downcast<T: Any + Send + Sync>(key: &str, value: ContextValue) -> StateResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| StateError::TypeMismatch {
        key:      key.to_owned(),
        expected: type_name::<T>(),
    })
}

/// Plain map with no invalidation logic; `State` layers predicates on top.
#[derive(Default)]
pub struct Context {
    values: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) -> Option<ContextValue> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
