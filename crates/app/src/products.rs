use axum::extract::{Path, State};
use tracing::info;

use storefront_core::{
    types::{Category, Product, ProductStatus, ProductView, Tag},
    validation::ProductInput,
    Collection, Page, Stored,
};

use crate::envelope::{
    created, deleted, ok, page_body, parse_id, raw, ApiError, ApiJson, ApiQuery, ApiResult,
};
use crate::list_cache::ListCache;
use crate::listing::{cached, status_is, ListQuery};
use crate::references::{ensure_exist, SummaryIndex};
use crate::router::AppState;

const STATUSES: &[&str] = &["active", "draft", "archived"];

/// Public catalogue: active products only.
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let mut filters = vec![status_is(ProductStatus::Active.as_str())];
    filters.extend(query.taxonomy_filters()?);
    filters.extend(query.featured_filter()?);

    let key = ListCache::key(Product::NAME, &request, &filters);
    cached(state.list_cache(), key, async {
        let page = state
            .storage()
            .documents::<Product>()
            .list(&request, &filters)
            .await?;
        page_body(&expand_page(&state, page).await?, request.limit)
    })
    .await
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let product = state
        .storage()
        .documents::<Product>()
        .get(&id)
        .await?
        .filter(|stored| stored.body.status == ProductStatus::Active)
        .ok_or(ApiError::NotFound("product"))?;
    ok(expand_one(&state, product).await?)
}

pub async fn admin_list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let mut filters = query.taxonomy_filters()?;
    filters.extend(query.featured_filter()?);
    filters.extend(query.status_filter(STATUSES)?);

    let page = state
        .storage()
        .documents::<Product>()
        .list(&request, &filters)
        .await?;
    raw(page_body(&expand_page(&state, page).await?, request.limit)?)
}

pub async fn admin_get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let product = state
        .storage()
        .documents::<Product>()
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    ok(expand_one(&state, product).await?)
}

pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult {
    let product = input.validate()?;
    check_references(&state, &product).await?;

    let stored = state
        .storage()
        .documents::<Product>()
        .insert(product, state.now())
        .await?;
    state.list_cache().clear();
    info!(stage = "api", product_id = %stored.id, "product created");
    created(expand_one(&state, stored).await?)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let product = input.validate()?;
    check_references(&state, &product).await?;

    let stored = state
        .storage()
        .documents::<Product>()
        .update(&id, product, state.now())
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    state.list_cache().clear();
    info!(stage = "api", product_id = %stored.id, "product updated");
    ok(expand_one(&state, stored).await?)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    if !state.storage().documents::<Product>().delete(&id).await? {
        return Err(ApiError::NotFound("product"));
    }
    state.list_cache().clear();
    info!(stage = "api", product_id = %id, "product deleted");
    deleted(&id)
}

async fn check_references(state: &AppState, product: &Product) -> Result<(), ApiError> {
    let storage = state.storage();
    ensure_exist(
        &storage.documents::<Category>(),
        "category_ids",
        &product.category_ids,
    )
    .await?;
    ensure_exist(&storage.documents::<Tag>(), "tag_ids", &product.tag_ids).await
}

/// Attaches category and tag summaries, loading each collection once.
async fn expand(
    state: &AppState,
    products: Vec<Stored<Product>>,
) -> Result<Vec<ProductView>, ApiError> {
    let storage = state.storage();
    let categories = SummaryIndex::load(
        &storage.documents::<Category>(),
        products.iter().flat_map(|p| &p.body.category_ids),
    )
    .await?;
    let tags = SummaryIndex::load(
        &storage.documents::<Tag>(),
        products.iter().flat_map(|p| &p.body.tag_ids),
    )
    .await?;

    Ok(products
        .into_iter()
        .map(|product| ProductView {
            categories: categories.resolve(&product.id, &product.body.category_ids),
            tags: tags.resolve(&product.id, &product.body.tag_ids),
            product,
        })
        .collect())
}

async fn expand_one(state: &AppState, product: Stored<Product>) -> Result<ProductView, ApiError> {
    expand(state, vec![product])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("product view missing after expansion".into()))
}

async fn expand_page(
    state: &AppState,
    page: Page<Stored<Product>>,
) -> Result<Page<ProductView>, ApiError> {
    Ok(Page {
        items: expand(state, page.items).await?,
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    })
}
