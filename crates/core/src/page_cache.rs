use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    time::{Duration, Instant},
};

/// Bounded map from a page key to a fetched page.
///
/// Entries expire `ttl` after insertion. Once more than `capacity` entries are
/// held, the least recently inserted ones are evicted. Lookups do not refresh
/// an entry; only re-inserting does.
#[derive(Debug)]
pub struct PageCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
    order: VecDeque<K>,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<K, V> PageCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns the value for `key` if it is still fresh at `now`.
    ///
    /// A stale entry is dropped as a side effect.
    pub fn get(&mut self, key: &K, now: Instant) -> Option<&V> {
        let fresh = self
            .entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.inserted_at) < self.ttl)?;
        if !fresh {
            self.invalidate(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Stores `value`, evicting the oldest insertions beyond capacity.
    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.order.retain(|existing| existing != &key);
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|existing| existing != key);
        Some(removed.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn serves_fresh_entries_and_drops_stale_ones() {
        let start = Instant::now();
        let mut cache = PageCache::new(4, TTL);
        cache.insert("a", 1, start);

        assert_eq!(cache.get(&"a", start + Duration::from_secs(59)), Some(&1));
        assert_eq!(cache.get(&"a", start + TTL), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_inserted_over_capacity() {
        let now = Instant::now();
        let mut cache = PageCache::new(2, TTL);
        cache.insert("a", 1, now);
        cache.insert("b", 2, now);
        // Reading does not protect an entry from eviction.
        assert_eq!(cache.get(&"a", now), Some(&1));
        cache.insert("c", 3, now);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a", now), None);
        assert_eq!(cache.get(&"b", now), Some(&2));
        assert_eq!(cache.get(&"c", now), Some(&3));
    }

    #[test]
    fn reinserting_moves_key_to_the_back() {
        let now = Instant::now();
        let mut cache = PageCache::new(2, TTL);
        cache.insert("a", 1, now);
        cache.insert("b", 2, now);
        cache.insert("a", 10, now + Duration::from_secs(1));
        cache.insert("c", 3, now + Duration::from_secs(2));

        assert_eq!(cache.get(&"b", now), None);
        assert_eq!(cache.get(&"a", now + Duration::from_secs(2)), Some(&10));
    }

    #[test]
    fn reinsert_refreshes_ttl() {
        let start = Instant::now();
        let mut cache = PageCache::new(2, TTL);
        cache.insert("a", 1, start);
        cache.insert("a", 2, start + Duration::from_secs(50));

        assert_eq!(cache.get(&"a", start + Duration::from_secs(100)), Some(&2));
    }

    #[test]
    fn zero_capacity_and_zero_ttl_never_serve() {
        let now = Instant::now();
        let mut disabled = PageCache::new(0, TTL);
        disabled.insert("a", 1, now);
        assert!(disabled.is_empty());

        let mut stale = PageCache::new(4, Duration::ZERO);
        stale.insert("a", 1, now);
        assert_eq!(stale.get(&"a", now), None);
    }

    #[test]
    fn invalidate_and_clear() {
        let now = Instant::now();
        let mut cache = PageCache::new(4, TTL);
        cache.insert(Some("cursor".to_string()), 1, now);
        cache.insert(None, 0, now);

        assert_eq!(cache.invalidate(&None), Some(0));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&Some("cursor".to_string()), now), None);
    }
}
