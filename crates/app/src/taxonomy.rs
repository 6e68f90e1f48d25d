//! Categories and tags share one set of handlers.

use axum::extract::{Path, State};
use serde::de::DeserializeOwned;
use tracing::info;

use storefront_core::{
    types::{Category, Tag},
    validation::{CategoryInput, TagInput},
    Summarize, ValidationError,
};

use crate::envelope::{
    created, deleted, ok, page_body, parse_id, raw, ApiError, ApiJson, ApiQuery, ApiResult,
};
use crate::list_cache::ListCache;
use crate::listing::{cached, ListQuery};
use crate::router::AppState;

pub trait Taxonomy: Summarize {
    /// Singular name used in messages and logs.
    const LABEL: &'static str;
    type Input: DeserializeOwned + Send + 'static;

    fn from_input(input: Self::Input) -> Result<Self, ValidationError>;
}

impl Taxonomy for Category {
    const LABEL: &'static str = "category";
    type Input = CategoryInput;

    fn from_input(input: CategoryInput) -> Result<Self, ValidationError> {
        input.validate()
    }
}

impl Taxonomy for Tag {
    const LABEL: &'static str = "tag";
    type Input = TagInput;

    fn from_input(input: TagInput) -> Result<Self, ValidationError> {
        input.validate()
    }
}

pub async fn list<T: Taxonomy>(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let key = ListCache::key(T::NAME, &request, &[]);
    cached(state.list_cache(), key, async {
        let page = state.storage().documents::<T>().list(&request, &[]).await?;
        page_body(&page, request.limit)
    })
    .await
}

pub async fn admin_list<T: Taxonomy>(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let page = state.storage().documents::<T>().list(&request, &[]).await?;
    raw(page_body(&page, request.limit)?)
}

pub async fn get<T: Taxonomy>(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let stored = state
        .storage()
        .documents::<T>()
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound(T::LABEL))?;
    ok(stored)
}

pub async fn create<T: Taxonomy>(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<T::Input>,
) -> ApiResult {
    let body = T::from_input(input)?;
    let stored = state
        .storage()
        .documents::<T>()
        .insert(body, state.now())
        .await?;
    state.list_cache().clear();
    info!(stage = "api", kind = T::LABEL, id = %stored.id, "taxonomy entry created");
    created(stored)
}

pub async fn update<T: Taxonomy>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<T::Input>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let body = T::from_input(input)?;
    let stored = state
        .storage()
        .documents::<T>()
        .update(&id, body, state.now())
        .await?
        .ok_or(ApiError::NotFound(T::LABEL))?;
    state.list_cache().clear();
    info!(stage = "api", kind = T::LABEL, id = %stored.id, "taxonomy entry updated");
    ok(stored)
}

/// Deletes the entry. Documents still pointing at it drop the reference when read.
pub async fn delete<T: Taxonomy>(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    if !state.storage().documents::<T>().delete(&id).await? {
        return Err(ApiError::NotFound(T::LABEL));
    }
    state.list_cache().clear();
    info!(stage = "api", kind = T::LABEL, %id, "taxonomy entry deleted");
    deleted(&id)
}
