//! Result cache port.
//!
//! The engine itself never caches; callers inject a [`ResultCache`] and
//! key entries with [`cache_key`].

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};

/// Key/value store for computed results.
pub trait ResultCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: String, value: V);
}

/// Deterministic key from a result kind and its ordered parameters,
/// e.g. `hazard|station=CCCC|im=pSA_0.1`.
pub fn cache_key<V: Display>(kind: &str, params: &[(&str, V)]) -> String {
    let mut key = kind.to_string();
    for (name, value) in params {
        key.push('|');
        key.push_str(name);
        key.push('=');
        key.push_str(&value.to_string());
    }
    key
}

/// Process-local cache; values are cloned out on `get`.
pub struct InMemoryCache<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V> InMemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, V>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> ResultCache<V> for InMemoryCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let value = self.lock().get(key).cloned();
        tracing::trace!(key, hit = value.is_some(), "Cache lookup");
        value
    }

    fn set(&self, key: String, value: V) {
        self.lock().insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_keeps_parameter_order() {
        let key = cache_key("hazard", &[("station", "CCCC"), ("im", "pSA_0.1")]);
        assert_eq!(key, "hazard|station=CCCC|im=pSA_0.1");
        assert_ne!(
            key,
            cache_key("hazard", &[("im", "pSA_0.1"), ("station", "CCCC")])
        );
    }

    #[test]
    fn get_after_set() {
        let cache = InMemoryCache::new();
        assert!(cache.get("a").is_none());
        cache.set("a".into(), 1.5);
        cache.set("a".into(), 2.5);
        assert_eq!(cache.get("a"), Some(2.5));
        assert_eq!(cache.len(), 1);
    }
}
