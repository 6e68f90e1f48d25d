use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use storefront_core::{DocumentId, Page, PaginationError, ValidationError};
use storefront_storage::DocumentError;

pub type ApiResult = Result<Response, ApiError>;

/// Failure returned by any API handler, rendered as `{"success": false, "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or invalid admin token")]
    Unauthorized,
    #[error("admin API is disabled")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage failure: {0}")]
    Storage(#[from] DocumentError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Pagination(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(stage = "api", error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// JSON body extractor whose rejections use the API envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejections use the API envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub fn parse_id(raw: &str) -> Result<DocumentId, ApiError> {
    DocumentId::parse(raw).map_err(|_| ApiError::BadRequest(format!("invalid id: {raw}")))
}

#[derive(Debug, Serialize)]
struct Success<T> {
    success: bool,
    data: T,
}

pub fn respond<T: Serialize>(status: StatusCode, data: T) -> ApiResult {
    Ok((
        status,
        Json(Success {
            success: true,
            data,
        }),
    )
        .into_response())
}

pub fn ok<T: Serialize>(data: T) -> ApiResult {
    respond(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> ApiResult {
    respond(StatusCode::CREATED, data)
}

pub fn deleted(id: &DocumentId) -> ApiResult {
    ok(json!({ "id": id }))
}

/// Sends an already assembled envelope.
pub fn raw(body: Value) -> ApiResult {
    Ok(Json(body).into_response())
}

/// Builds the list envelope as a JSON value so it can be cached as is.
pub fn page_body<T: Serialize>(page: &Page<T>, limit: u32) -> Result<Value, ApiError> {
    let data = serde_json::to_value(&page.items)
        .map_err(|err| ApiError::Internal(format!("failed to encode page: {err}")))?;
    Ok(json!({
        "success": true,
        "data": data,
        "pagination": {
            "next_cursor": page.next_cursor,
            "has_more": page.has_more,
            "limit": limit,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn validation_errors_render_field_message() {
        let response = ApiError::from(ValidationError::new("name", "must not be empty"))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body, json!({ "success": false, "message": "name: must not be empty" }));
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn page_body_carries_pagination() {
        let id = DocumentId::parse("01HZX0000000000000000000D1").expect("id");
        let page = Page {
            items: vec![json!({ "id": id })],
            next_cursor: Some(id.clone()),
            has_more: true,
        };
        let body = page_body(&page, 1).expect("body");
        assert_eq!(body["pagination"]["next_cursor"], id.as_str());
        assert_eq!(body["pagination"]["limit"], 1);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn not_found_names_resource() {
        let err = ApiError::NotFound("product");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "product not found");
    }
}
