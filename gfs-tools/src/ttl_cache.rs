//! A small TTL-bounded cache, used by the client for chunk-location and
//! lease-holder lookups (spec.md §4.6): entries expire on their own, there
//! is no explicit invalidation RPC.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Cache mapping `K -> V` where every entry carries its own expiration.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the cached value if present and not yet expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|e| {
            if e.expires_at > Instant::now() {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_once_expired() {
        let mut cache = TtlCache::new();
        cache.insert("k", 1, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn returns_value_within_ttl() {
        let mut cache = TtlCache::new();
        cache.insert("k", 42, Duration::from_secs(60));
        assert_eq!(cache.get(&"k"), Some(42));
    }
}
