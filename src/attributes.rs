//! Per-exchange attribute storage.
//!
//! Attributes are a string-keyed side channel between handlers of one
//! exchange. The table lives in the request's [`http::Extensions`], so it is
//! visible to anything else that holds the request.
use core::any::{type_name, Any};
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ContextError;

#[derive(Clone)]
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// String-keyed, type-erased values with checked retrieval.
///
/// ```rust
/// use http_context::{Attributes, ContextError};
///
/// let mut attributes = Attributes::default();
/// attributes.insert("user_id", 42u64);
///
/// assert_eq!(attributes.get::<u64>("user_id").unwrap(), Some(&42));
/// assert!(matches!(
///     attributes.get::<String>("user_id"),
///     Err(ContextError::AttributeType { .. })
/// ));
/// assert_eq!(attributes.get::<u64>("missing").unwrap(), None);
/// ```
#[derive(Clone, Default)]
pub struct Attributes {
    entries: HashMap<String, Entry>,
}

impl Attributes {
    /// Stores `value` under `key`, replacing any previous value of any type.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(
            key.into(),
            Entry {
                value: Arc::new(value),
                type_name: type_name::<T>(),
            },
        );
    }

    /// Borrows the value under `key` as a `T`.
    ///
    /// # Errors
    ///
    /// [`ContextError::AttributeType`] when a value is present but is not a `T`.
    pub fn get<T>(&self, key: &str) -> Result<Option<&T>, ContextError>
    where
        T: Any + Send + Sync,
    {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        entry
            .value
            .downcast_ref::<T>()
            .map(Some)
            .ok_or_else(|| ContextError::AttributeType {
                key: key.to_owned(),
                expected: type_name::<T>(),
                found: entry.type_name,
            })
    }

    /// Removes the value under `key`, returning whether one was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether `key` holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over the stored keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, entry)| (key, entry.type_name)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_across_types() {
        let mut attributes = Attributes::default();
        attributes.insert("k", 1u8);
        attributes.insert("k", "text");
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes.get::<&str>("k").unwrap(), Some(&"text"));
    }

    #[test]
    fn mismatch_names_both_types() {
        let mut attributes = Attributes::default();
        attributes.insert("count", 3i32);
        let err = attributes.get::<u32>("count").unwrap_err();
        assert_eq!(
            err.to_string(),
            "attribute `count` holds a `i32`, not the requested `u32`"
        );
    }

    #[test]
    fn clones_share_values() {
        let mut attributes = Attributes::default();
        attributes.insert("list", vec![1, 2, 3]);
        let copy = attributes.clone();
        assert!(attributes.remove("list"));
        assert_eq!(copy.get::<Vec<i32>>("list").unwrap(), Some(&vec![1, 2, 3]));
        assert!(!attributes.contains("list"));
    }
}
