use axum::extract::{Path, State};
use serde_json::json;
use tracing::info;

use storefront_core::{
    types::Contact,
    validation::{ContactInput, ContactStatusInput},
};

use crate::envelope::{
    created, deleted, ok, page_body, parse_id, raw, ApiError, ApiJson, ApiQuery, ApiResult,
};
use crate::listing::ListQuery;
use crate::router::AppState;

const STATUSES: &[&str] = &["new", "read", "replied", "archived"];

/// Stores a contact form submission, then notifies the owner and the submitter.
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ContactInput>,
) -> ApiResult {
    let contact = input.validate()?;
    let now = state.now();
    let stored = state
        .storage()
        .documents::<Contact>()
        .insert(contact, now)
        .await?;
    info!(stage = "api", contact_id = %stored.id, "contact submission stored");

    let notifications = state.notifier().contact_submitted(&stored, now).await;
    created(json!({
        "id": stored.id,
        "created_at": stored.created_at,
        "notifications": notifications,
    }))
}

pub async fn admin_list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    let request = query.page_request()?;
    let filters: Vec<_> = query.status_filter(STATUSES)?.into_iter().collect();
    let page = state
        .storage()
        .documents::<Contact>()
        .list(&request, &filters)
        .await?;
    raw(page_body(&page, request.limit)?)
}

pub async fn admin_get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let contact = state
        .storage()
        .documents::<Contact>()
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound("contact"))?;
    ok(contact)
}

/// Moves a submission through its triage states.
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ContactStatusInput>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let status = input.validate()?;

    let repo = state.storage().documents::<Contact>();
    let mut contact = repo.get(&id).await?.ok_or(ApiError::NotFound("contact"))?;
    contact.body.status = status;
    let stored = repo
        .update(&id, contact.body, state.now())
        .await?
        .ok_or(ApiError::NotFound("contact"))?;
    state.list_cache().clear();
    info!(stage = "api", contact_id = %id, status = status.as_str(), "contact status changed");
    ok(stored)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    if !state.storage().documents::<Contact>().delete(&id).await? {
        return Err(ApiError::NotFound("contact"));
    }
    state.list_cache().clear();
    info!(stage = "api", contact_id = %id, "contact deleted");
    deleted(&id)
}
