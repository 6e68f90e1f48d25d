use axum::extract::{Path, State};
use tracing::info;

use storefront_core::{
    types::{Blog, BlogStatus, BlogView, Category, Tag},
    validation::BlogInput,
    Collection, Page, Stored,
};

use crate::envelope::{
    created, deleted, ok, page_body, parse_id, raw, ApiError, ApiJson, ApiQuery, ApiResult,
};
use crate::list_cache::ListCache;
use crate::listing::{cached, status_is, ListQuery};
use crate::references::{ensure_exist, SummaryIndex};
use crate::router::AppState;

const STATUSES: &[&str] = &["draft", "published"];

/// Public blog feed: published posts only.
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let mut filters = vec![status_is(BlogStatus::Published.as_str())];
    filters.extend(query.taxonomy_filters()?);

    let key = ListCache::key(Blog::NAME, &request, &filters);
    cached(state.list_cache(), key, async {
        let page = state
            .storage()
            .documents::<Blog>()
            .list(&request, &filters)
            .await?;
        page_body(&expand_page(&state, page).await?, request.limit)
    })
    .await
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let blog = state
        .storage()
        .documents::<Blog>()
        .get(&id)
        .await?
        .filter(|stored| stored.body.status == BlogStatus::Published)
        .ok_or(ApiError::NotFound("blog"))?;
    ok(expand_one(&state, blog).await?)
}

pub async fn admin_list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let mut filters = query.taxonomy_filters()?;
    filters.extend(query.status_filter(STATUSES)?);

    let page = state
        .storage()
        .documents::<Blog>()
        .list(&request, &filters)
        .await?;
    raw(page_body(&expand_page(&state, page).await?, request.limit)?)
}

pub async fn admin_get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let blog = state
        .storage()
        .documents::<Blog>()
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound("blog"))?;
    ok(expand_one(&state, blog).await?)
}

pub async fn create(State(state): State<AppState>, ApiJson(input): ApiJson<BlogInput>) -> ApiResult {
    let mut blog = input.validate()?;
    check_references(&state, &blog).await?;

    let now = state.now();
    blog.stamp_publication(None, now);
    let stored = state.storage().documents::<Blog>().insert(blog, now).await?;
    state.list_cache().clear();
    info!(stage = "api", blog_id = %stored.id, status = stored.body.status.as_str(), "blog created");
    created(expand_one(&state, stored).await?)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<BlogInput>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let mut blog = input.validate()?;
    check_references(&state, &blog).await?;

    let repo = state.storage().documents::<Blog>();
    let previous = repo.get(&id).await?.ok_or(ApiError::NotFound("blog"))?;
    let now = state.now();
    blog.stamp_publication(previous.body.published_at, now);

    let stored = repo
        .update(&id, blog, now)
        .await?
        .ok_or(ApiError::NotFound("blog"))?;
    state.list_cache().clear();
    info!(stage = "api", blog_id = %stored.id, status = stored.body.status.as_str(), "blog updated");
    ok(expand_one(&state, stored).await?)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    if !state.storage().documents::<Blog>().delete(&id).await? {
        return Err(ApiError::NotFound("blog"));
    }
    state.list_cache().clear();
    info!(stage = "api", blog_id = %id, "blog deleted");
    deleted(&id)
}

async fn check_references(state: &AppState, blog: &Blog) -> Result<(), ApiError> {
    let storage = state.storage();
    ensure_exist(
        &storage.documents::<Category>(),
        "category_ids",
        &blog.category_ids,
    )
    .await?;
    ensure_exist(&storage.documents::<Tag>(), "tag_ids", &blog.tag_ids).await
}

async fn expand(state: &AppState, blogs: Vec<Stored<Blog>>) -> Result<Vec<BlogView>, ApiError> {
    let storage = state.storage();
    let categories = SummaryIndex::load(
        &storage.documents::<Category>(),
        blogs.iter().flat_map(|b| &b.body.category_ids),
    )
    .await?;
    let tags = SummaryIndex::load(
        &storage.documents::<Tag>(),
        blogs.iter().flat_map(|b| &b.body.tag_ids),
    )
    .await?;

    Ok(blogs
        .into_iter()
        .map(|blog| BlogView {
            categories: categories.resolve(&blog.id, &blog.body.category_ids),
            tags: tags.resolve(&blog.id, &blog.body.tag_ids),
            blog,
        })
        .collect())
}

async fn expand_one(state: &AppState, blog: Stored<Blog>) -> Result<BlogView, ApiError> {
    expand(state, vec![blog])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("blog view missing after expansion".into()))
}

async fn expand_page(state: &AppState, page: Page<Stored<Blog>>) -> Result<Page<BlogView>, ApiError> {
    Ok(Page {
        items: expand(state, page.items).await?,
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    })
}
