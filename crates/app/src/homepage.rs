use axum::extract::State;
use tracing::info;

use storefront_core::{
    types::{Homepage, HomepageView, Product},
    validation::HomepageInput,
    Stored,
};

use crate::envelope::{ok, ApiError, ApiJson, ApiResult};
use crate::references::{ensure_exist, SummaryIndex};
use crate::router::AppState;

pub async fn get(State(state): State<AppState>) -> ApiResult {
    let homepage = state
        .storage()
        .documents::<Homepage>()
        .get(&Homepage::document_id())
        .await?
        .ok_or(ApiError::NotFound("homepage"))?;
    ok(view(&state, homepage).await?)
}

/// Creates or replaces the singleton homepage document.
pub async fn put(State(state): State<AppState>, ApiJson(input): ApiJson<HomepageInput>) -> ApiResult {
    let homepage = input.validate()?;
    ensure_exist(
        &state.storage().documents::<Product>(),
        "featured_product_ids",
        &homepage.featured_product_ids,
    )
    .await?;

    let stored = state
        .storage()
        .documents::<Homepage>()
        .upsert(&Homepage::document_id(), homepage, state.now())
        .await?;
    state.list_cache().clear();
    info!(
        stage = "api",
        featured = stored.body.featured_product_ids.len(),
        "homepage updated"
    );
    ok(view(&state, stored).await?)
}

async fn view(state: &AppState, homepage: Stored<Homepage>) -> Result<HomepageView, ApiError> {
    let products = SummaryIndex::load(
        &state.storage().documents::<Product>(),
        &homepage.body.featured_product_ids,
    )
    .await?;
    Ok(HomepageView {
        featured_products: products.resolve(&homepage.id, &homepage.body.featured_product_ids),
        homepage,
    })
}
