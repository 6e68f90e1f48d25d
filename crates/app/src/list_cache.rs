use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use metrics::counter;
use serde_json::Value;
use tracing::debug;

use storefront_core::{PageCache, PageRequest};
use storefront_storage::{FilterValue, ListFilter};

/// Memoised public list responses keyed by resource and normalised query.
///
/// Every `clear` starts a new generation. A body built during an older
/// generation is never stored.
#[derive(Clone)]
pub struct ListCache {
    inner: Arc<Mutex<CacheState>>,
}

struct CacheState {
    pages: PageCache<String, Value>,
    generation: u64,
}

impl ListCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState {
                pages: PageCache::new(capacity, ttl),
                generation: 0,
            })),
        }
    }

    /// Key for one list query. Filters are rendered in the order given.
    pub fn key(resource: &str, request: &PageRequest, filters: &[ListFilter]) -> String {
        let mut key = format!(
            "{resource}?cursor={}&limit={}&sort={}",
            request.cursor.as_ref().map(|id| id.as_str()).unwrap_or(""),
            request.limit,
            request.sort.as_str()
        );
        for filter in filters {
            match filter {
                ListFilter::ArrayContains { path, value } => {
                    key.push_str(&format!("&{path}~{value}"));
                }
                ListFilter::Equals { path, value } => match value {
                    FilterValue::Text(text) => key.push_str(&format!("&{path}={text}")),
                    FilterValue::Bool(flag) => key.push_str(&format!("&{path}={flag}")),
                },
            }
        }
        key
    }

    /// Looks `key` up and returns the current generation with the result.
    pub fn get(&self, key: &str) -> (Option<Value>, u64) {
        let mut state = self.lock();
        let hit = state.pages.get(&key.to_string(), Instant::now()).cloned();
        let result = if hit.is_some() { "hit" } else { "miss" };
        counter!("list_cache_total", "result" => result).increment(1);
        (hit, state.generation)
    }

    /// Stores `body` unless the cache was cleared since `generation`.
    pub fn insert(&self, generation: u64, key: String, body: Value) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(stage = "cache", key = %key, "stale list body discarded");
            return false;
        }
        state.pages.insert(key, body, Instant::now());
        true
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        if !state.pages.is_empty() {
            debug!(stage = "cache", entries = state.pages.len(), "list cache cleared");
        }
        state.pages.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().pages.len()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_includes_paging_and_filters() {
        let request = PageRequest::from_params(None, Some("5"), Some("oldest")).expect("request");
        let key = ListCache::key(
            "products",
            &request,
            &[
                ListFilter::Equals {
                    path: "$.status",
                    value: FilterValue::Text("active".into()),
                },
                ListFilter::ArrayContains {
                    path: "$.category_ids",
                    value: "C1".into(),
                },
                ListFilter::Equals {
                    path: "$.featured",
                    value: FilterValue::Bool(true),
                },
            ],
        );
        assert_eq!(
            key,
            "products?cursor=&limit=5&sort=asc&$.status=active&$.category_ids~C1&$.featured=true"
        );
    }

    #[test]
    fn clear_drops_every_entry() {
        let cache = ListCache::new(8, Duration::from_secs(30));
        let (_, generation) = cache.get("a");
        assert!(cache.insert(generation, "a".into(), json!(1)));
        assert!(cache.insert(generation, "b".into(), json!(2)));
        assert_eq!(cache.get("a").0, Some(json!(1)));

        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get("b").0, None);
    }

    #[test]
    fn body_built_before_clear_is_not_stored() {
        let cache = ListCache::new(8, Duration::from_secs(30));
        let (miss, generation) = cache.get("products");
        assert!(miss.is_none());

        cache.clear();
        assert!(!cache.insert(generation, "products".into(), json!({ "data": ["old"] })));
        assert_eq!(cache.len(), 0);

        let (_, current) = cache.get("products");
        assert!(cache.insert(current, "products".into(), json!({ "data": ["new"] })));
        assert_eq!(cache.get("products").0, Some(json!({ "data": ["new"] })));
    }
}
