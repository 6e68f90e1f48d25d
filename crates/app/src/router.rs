use std::sync::Arc;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use subtle::ConstantTimeEq;
use tracing::warn;

use storefront_core::types::{Category, Tag};
use storefront_storage::Database;

use crate::envelope::ApiError;
use crate::list_cache::ListCache;
use crate::notifier::Notifier;
use crate::{about, blogs, contacts, homepage, products, taxonomy, telemetry};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Clock,
    admin_token: Option<Arc<str>>,
    notifier: Notifier,
    list_cache: ListCache,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        admin_token: Option<String>,
        notifier: Notifier,
        list_cache: ListCache,
    ) -> Self {
        Self {
            metrics,
            storage,
            clock: Arc::new(Utc::now),
            admin_token: admin_token.map(Arc::from),
            notifier,
            list_cache,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn list_cache(&self) -> &ListCache {
        &self.list_cache
    }

    fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }
}

pub fn app_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/products",
            get(products::admin_list).post(products::create),
        )
        .route(
            "/products/:id",
            get(products::admin_get)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/blogs", get(blogs::admin_list).post(blogs::create))
        .route(
            "/blogs/:id",
            get(blogs::admin_get).put(blogs::update).delete(blogs::delete),
        )
        .route(
            "/categories",
            get(taxonomy::admin_list::<Category>).post(taxonomy::create::<Category>),
        )
        .route(
            "/categories/:id",
            get(taxonomy::get::<Category>)
                .put(taxonomy::update::<Category>)
                .delete(taxonomy::delete::<Category>),
        )
        .route(
            "/tags",
            get(taxonomy::admin_list::<Tag>).post(taxonomy::create::<Tag>),
        )
        .route(
            "/tags/:id",
            get(taxonomy::get::<Tag>)
                .put(taxonomy::update::<Tag>)
                .delete(taxonomy::delete::<Tag>),
        )
        .route("/about", get(about::list).post(about::create))
        .route(
            "/about/:id",
            get(about::get).put(about::update).delete(about::delete),
        )
        .route("/homepage", put(homepage::put))
        .route("/contacts", get(contacts::admin_list))
        .route(
            "/contacts/:id",
            get(contacts::admin_get)
                .patch(contacts::set_status)
                .delete(contacts::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/products", get(products::list))
        .route("/api/products/:id", get(products::get))
        .route("/api/blogs", get(blogs::list))
        .route("/api/blogs/:id", get(blogs::get))
        .route("/api/categories", get(taxonomy::list::<Category>))
        .route("/api/categories/:id", get(taxonomy::get::<Category>))
        .route("/api/tags", get(taxonomy::list::<Tag>))
        .route("/api/tags/:id", get(taxonomy::get::<Tag>))
        .route("/api/homepage", get(homepage::get))
        .route("/api/about", get(about::list))
        .route("/api/about/:id", get(about::get))
        .route("/api/contact", post(contacts::submit))
        .nest("/api/admin", admin)
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

/// Admits requests carrying `Authorization: Bearer <ADMIN_TOKEN>`.
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token() else {
        return Err(ApiError::Forbidden);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        warn!(stage = "api", path = %request.uri().path(), "admin request rejected");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

async fn track_requests(matched: Option<MatchedPath>, request: Request, next: Next) -> Response {
    let route = matched.map(|path| path.as_str().to_owned());
    let method = request.method().as_str().to_owned();
    let response = next.run(request).await;

    if let Some(route) = route.filter(|route| route.starts_with("/api/")) {
        let status = response.status();
        let result = if status.is_server_error() {
            "error"
        } else if status.is_client_error() {
            "rejected"
        } else {
            "ok"
        };
        counter!(
            "api_requests_total",
            "resource" => route,
            "op" => method,
            "result" => result
        )
        .increment(1);
    }
    response
}
