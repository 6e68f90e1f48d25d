use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::debug;

use storefront_core::{DocumentId, Page, PageCache, PageRequest};

use crate::api::{ClientError, StorefrontClient};

pub const DEFAULT_CACHE_PAGES: usize = 20;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

type CursorKey = Option<String>;

/// Cursor-paginated loader for one list resource with a local page cache.
///
/// Only the most recent `load` is kept alive; starting another aborts the
/// previous request, whose caller receives [`FetchError::Cancelled`].
pub struct PaginatedFetch<T> {
    client: StorefrontClient,
    resource: String,
    request: PageRequest,
    filters: Vec<(String, String)>,
    state: Arc<Mutex<FetchState<T>>>,
}

struct FetchState<T> {
    cache: PageCache<CursorKey, Arc<Page<T>>>,
    in_flight: Option<InFlight>,
    generation: u64,
    /// Bumped by `invalidate`; fetches started before it are not cached.
    epoch: u64,
}

struct InFlight {
    generation: u64,
    handle: AbortHandle,
}

impl<T> PaginatedFetch<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(client: StorefrontClient, resource: impl Into<String>, request: PageRequest) -> Self {
        Self::with_cache(client, resource, request, DEFAULT_CACHE_PAGES, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache(
        client: StorefrontClient,
        resource: impl Into<String>,
        request: PageRequest,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            resource: resource.into(),
            request,
            filters: Vec::new(),
            state: Arc::new(Mutex::new(FetchState {
                cache: PageCache::new(capacity, ttl),
                in_flight: None,
                generation: 0,
                epoch: 0,
            })),
        }
    }

    /// Adds a query filter sent with every page request.
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    /// Loads the page starting after `cursor`, serving fresh cached pages
    /// without a request.
    pub async fn load(&self, cursor: Option<DocumentId>) -> Result<Arc<Page<T>>, FetchError> {
        let key: CursorKey = cursor.as_ref().map(|id| id.as_str().to_string());

        let (generation, epoch, task) = {
            let mut state = self.lock();
            if let Some(page) = state.cache.get(&key, Instant::now()) {
                debug!(stage = "cache", resource = %self.resource, "page served from cache");
                return Ok(Arc::clone(page));
            }
            if let Some(previous) = state.in_flight.take() {
                previous.handle.abort();
            }
            state.generation += 1;
            let generation = state.generation;

            let client = self.client.clone();
            let resource = self.resource.clone();
            let request = self.request.with_cursor(cursor);
            let filters = self.filters.clone();
            let task = tokio::spawn(async move {
                let filters: Vec<(&str, &str)> = filters
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                client
                    .list_page_filtered::<T>(&resource, &request, &filters)
                    .await
            });
            state.in_flight = Some(InFlight {
                generation,
                handle: task.abort_handle(),
            });
            (generation, state.epoch, task)
        };

        let outcome = task.await;

        let mut state = self.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|current| current.generation == generation)
        {
            state.in_flight = None;
        }

        match outcome {
            Ok(Ok(page)) => {
                let page = Arc::new(page);
                if state.epoch == epoch {
                    state.cache.insert(key, Arc::clone(&page), Instant::now());
                }
                Ok(page)
            }
            Ok(Err(err)) => Err(FetchError::Client(err)),
            Err(join) if join.is_cancelled() => Err(FetchError::Cancelled),
            Err(join) => Err(FetchError::Task(join.to_string())),
        }
    }

    /// Aborts the in-flight request, if any.
    pub fn cancel(&self) {
        if let Some(in_flight) = self.lock().in_flight.take() {
            in_flight.handle.abort();
        }
    }

    /// Drops every cached page, including the one a running fetch would add.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.cache.clear();
    }

    pub fn cached_pages(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, FetchState<T>> {
        // A panic while holding the lock cannot leave the cache half-written.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request was superseded or cancelled")]
    Cancelled,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("fetch task failed: {0}")]
    Task(String),
}
