use axum::extract::{Path, State};
use tracing::info;

use storefront_core::{types::AboutSection, validation::AboutSectionInput, Stored};

use crate::envelope::{created, deleted, ok, parse_id, ApiError, ApiJson, ApiResult};
use crate::router::AppState;

/// Every section ordered by `position`; ties keep creation order.
pub async fn list(State(state): State<AppState>) -> ApiResult {
    let mut sections = state
        .storage()
        .documents::<AboutSection>()
        .list_all(&[])
        .await?;
    sort_sections(&mut sections);
    ok(sections)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let section = state
        .storage()
        .documents::<AboutSection>()
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound("about section"))?;
    ok(section)
}

pub async fn create(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<AboutSectionInput>,
) -> ApiResult {
    let section = input.validate()?;
    let stored = state
        .storage()
        .documents::<AboutSection>()
        .insert(section, state.now())
        .await?;
    state.list_cache().clear();
    info!(stage = "api", section_id = %stored.id, "about section created");
    created(stored)
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<AboutSectionInput>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let section = input.validate()?;
    let stored = state
        .storage()
        .documents::<AboutSection>()
        .update(&id, section, state.now())
        .await?
        .ok_or(ApiError::NotFound("about section"))?;
    state.list_cache().clear();
    info!(stage = "api", section_id = %stored.id, "about section updated");
    ok(stored)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    if !state.storage().documents::<AboutSection>().delete(&id).await? {
        return Err(ApiError::NotFound("about section"));
    }
    state.list_cache().clear();
    info!(stage = "api", section_id = %id, "about section deleted");
    deleted(&id)
}

fn sort_sections(sections: &mut [Stored<AboutSection>]) {
    sections.sort_by(|a, b| {
        a.body
            .position
            .cmp(&b.body.position)
            .then_with(|| a.id.cmp(&b.id))
    });
}
