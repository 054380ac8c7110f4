// Memoization tables for post-load queries
use ahash::AHashMap;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Append-only memo table. Readers share the lock; a miss computes the
/// value outside the lock and the first writer wins.
pub struct MemoCache<K, V> {
    map: RwLock<AHashMap<K, V>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            map: RwLock::new(AHashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.map.read().get(key).cloned();
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Stores `value` unless another caller got there first; returns the
    /// value now in the table.
    pub fn insert(&self, key: K, value: V) -> V {
        self.map.write().entry(key).or_insert(value).clone()
    }

    pub fn get_or_insert_with<E, F>(&self, key: &K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        Ok(self.insert(key.clone(), value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.map.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

impl<K, V> Default for MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoCache")
            .field("entries", &self.map.read().len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_miss() {
        let cache: MemoCache<&str, usize> = MemoCache::new();
        let mut calls = 0;
        let first: Result<usize, ()> = cache.get_or_insert_with(&"a", || {
            calls += 1;
            Ok(1)
        });
        let second: Result<usize, ()> = cache.get_or_insert_with(&"a", || {
            calls += 1;
            Ok(2)
        });

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: MemoCache<u32, u32> = MemoCache::new();
        assert_eq!(cache.get_or_insert_with(&7, || Err("boom")), Err("boom"));
        assert!(!cache.contains(&7));

        cache.insert(7, 70);
        assert_eq!(cache.insert(7, 71), 70);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }
}
