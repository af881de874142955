//! String-keyed handler-to-handler data passing

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Typed values stored under string keys for the lifetime of one operation
///
/// Handlers use it to hand data to each other (e.g. a shape handler
/// publishing collider descriptions a body handler later consumes).
#[derive(Default)]
pub struct SideChannel {
    data: BTreeMap<String, Box<dyn Any + Send + Sync>>,
}

impl SideChannel {
    /// Create an empty side channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing whatever was under the key
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Retrieve a value; `None` if absent or of a different type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.data.get(key)?.downcast_ref()
    }

    /// Mutable value under `key`, if it is a `T`
    pub fn get_mut<T: Any + Send + Sync>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key)?.downcast_mut()
    }

    /// Get the value under `key`, inserting `T::default()` if absent
    ///
    /// Returns `None` when the key already holds a value of another type.
    pub fn get_or_default<T: Any + Send + Sync + Default>(&mut self, key: &str) -> Option<&mut T> {
        self.data
            .entry(key.to_string())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut()
    }

    /// Remove and return a value if it has the requested type
    pub fn remove<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        if !self.data.get(key)?.is::<T>() {
            return None;
        }
        self.data.remove(key)?.downcast::<T>().ok().map(|b| *b)
    }

    /// Check if `key` holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Keys currently set
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl fmt::Debug for SideChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.data.keys()).finish()
    }
}
