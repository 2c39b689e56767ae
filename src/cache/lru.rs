use indexmap::IndexMap;
use std::hash::Hash;

/// Capacity-bounded mapping from `K` to `V` with LRU eviction (component B).
///
/// Built on `indexmap::IndexMap` so that both hash lookup and recency reordering are
/// O(1) average: the map's iteration order *is* the recency order, oldest first.
/// Callers must serialize access themselves; this cache makes no threading promises.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: IndexMap<K, V>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be positive");
        LruCache {
            capacity,
            entries: IndexMap::with_capacity(capacity),
        }
    }

    pub fn exists(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns a clone of the value, moving `key` to most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let (idx, _, value) = self.entries.shift_remove_full(key)?;
        let value_clone = value.clone();
        // Re-insert at the back (most-recent end). `idx` is unused beyond the
        // removal above; position is always reset on access.
        let _ = idx;
        self.entries.insert(key.clone(), value);
        Some(value_clone)
    }

    /// Inserts or replaces `key`, moving it to most-recently-used, evicting the
    /// least-recently-used entry if capacity is exceeded.
    pub fn put(&mut self, key: K, value: V) {
        self.entries.shift_remove(&key);
        self.entries.insert(key, value);
        if self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_exists() {
        let mut c = LruCache::new(2);
        c.put("a", 1);
        assert!(c.exists(&"a"));
        assert_eq!(c.size(), 1);
    }

    #[test]
    fn eviction_after_capacity_exceeded() {
        let mut c = LruCache::new(2);
        c.put("a", 1);
        c.put("b", 2);
        c.put("c", 3);
        assert!(!c.exists(&"a"));
        assert!(c.exists(&"b"));
        assert!(c.exists(&"c"));
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn get_reorders_recency() {
        let mut c = LruCache::new(2);
        c.put("a", 1);
        c.put("b", 2);
        // touch "a" so "b" becomes least-recently-used
        assert_eq!(c.get(&"a"), Some(1));
        c.put("c", 3);
        assert!(!c.exists(&"b"));
        assert!(c.exists(&"a"));
        assert!(c.exists(&"c"));
    }

    #[test]
    fn put_replaces_existing_value() {
        let mut c = LruCache::new(2);
        c.put("a", 1);
        c.put("a", 2);
        assert_eq!(c.size(), 1);
        assert_eq!(c.get(&"a"), Some(2));
    }
}
