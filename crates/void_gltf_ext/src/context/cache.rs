//! Object identity cache for import

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use crate::error::{HandlerError, HandlerResult};

/// Constructed objects keyed by (kind, index)
///
/// Lets several nodes referencing the same document resource (e.g. a collider
/// shape at `shapes[2]`) share one constructed value.
#[derive(Default)]
pub struct ObjectCache {
    entries: HashMap<(String, usize), Box<dyn Any + Send + Sync>>,
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache the object built for resource `index` of `kind`
    pub fn insert<T: Any + Send + Sync>(&mut self, kind: &str, index: usize, value: T) {
        self.entries.insert((kind.to_string(), index), Box::new(value));
    }

    /// Cached object for resource `index` of `kind`, if it is a `T`
    pub fn get<T: Any + Send + Sync>(&self, kind: &str, index: usize) -> Option<&T> {
        self.entries.get(&(kind.to_string(), index))?.downcast_ref()
    }

    /// Return the cached value, constructing and caching it on first use
    ///
    /// A construction failure leaves the cache untouched. A cached value of a
    /// different type is replaced.
    pub fn get_or_try_insert_with<T, F>(&mut self, kind: &str, index: usize, build: F) -> HandlerResult<&T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> HandlerResult<T>,
    {
        let entry = match self.entries.entry((kind.to_string(), index)) {
            Entry::Occupied(e) if e.get().is::<T>() => e.into_mut(),
            Entry::Occupied(mut e) => {
                e.insert(Box::new(build()?));
                e.into_mut()
            }
            Entry::Vacant(e) => e.insert(Box::new(build()?)),
        };

        entry
            .downcast_ref::<T>()
            .ok_or_else(|| HandlerError::failed(format!("object cache entry {}[{}] has another type", kind, index)))
    }

    /// Check if resource `index` of `kind` is cached
    pub fn contains(&self, kind: &str, index: usize) -> bool {
        self.entries.contains_key(&(kind.to_string(), index))
    }

    /// Get the number of cached objects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached object
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_once() {
        let mut cache = ObjectCache::new();
        let mut builds = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("shapes", 2, || {
                    builds += 1;
                    Ok(String::from("box"))
                })
                .unwrap();
            assert_eq!(value, "box");
        }

        assert_eq!(builds, 1);
        assert!(cache.contains("shapes", 2));
        assert!(!cache.contains("shapes", 1));
    }

    #[test]
    fn test_failed_build_not_cached() {
        let mut cache = ObjectCache::new();
        let result = cache.get_or_try_insert_with::<u32, _>("shapes", 0, || {
            Err(HandlerError::failed("bad shape"))
        });

        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_kinds_are_separate() {
        let mut cache = ObjectCache::new();
        cache.insert("shapes", 0, 1u32);
        cache.insert("joints", 0, 2u32);

        assert_eq!(cache.get::<u32>("shapes", 0), Some(&1));
        assert_eq!(cache.get::<u32>("joints", 0), Some(&2));
        assert_eq!(cache.len(), 2);
    }
}
