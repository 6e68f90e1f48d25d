use serde::Deserialize;
use serde_json::Value;
use std::future::Future;

use storefront_core::{PageRequest, ValidationError};
use storefront_storage::{FilterValue, ListFilter};

use crate::envelope::{parse_id, raw, ApiError, ApiResult};
use crate::list_cache::ListCache;

/// Query parameters accepted by list endpoints. Each route reads the ones it supports.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub featured: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ListQuery {
    pub fn page_request(&self) -> Result<PageRequest, ApiError> {
        Ok(PageRequest::from_params(
            self.cursor.as_deref(),
            self.limit.as_deref(),
            self.sort.as_deref(),
        )?)
    }

    /// Membership filters for the `category` and `tag` parameters.
    pub fn taxonomy_filters(&self) -> Result<Vec<ListFilter>, ApiError> {
        let mut filters = Vec::new();
        for (raw, path) in [
            (present(&self.category), "$.category_ids"),
            (present(&self.tag), "$.tag_ids"),
        ] {
            if let Some(raw) = raw {
                let id = parse_id(raw)?;
                filters.push(ListFilter::ArrayContains {
                    path,
                    value: id.as_str().to_string(),
                });
            }
        }
        Ok(filters)
    }

    pub fn featured_filter(&self) -> Result<Option<ListFilter>, ApiError> {
        let Some(raw) = present(&self.featured) else {
            return Ok(None);
        };
        let flag = match raw {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ApiError::BadRequest(format!(
                    "featured must be true or false (got {other})"
                )))
            }
        };
        Ok(Some(ListFilter::Equals {
            path: "$.featured",
            value: FilterValue::Bool(flag),
        }))
    }

    /// Admin `status` filter, checked against the collection's allowed values.
    pub fn status_filter(
        &self,
        allowed: &[&'static str],
    ) -> Result<Option<ListFilter>, ApiError> {
        let Some(raw) = present(&self.status) else {
            return Ok(None);
        };
        let Some(status) = allowed.iter().find(|candidate| **candidate == raw) else {
            return Err(ValidationError::new(
                "status",
                format!("must be one of: {}", allowed.join(", ")),
            )
            .into());
        };
        Ok(Some(status_is(*status)))
    }
}

pub fn status_is(status: &'static str) -> ListFilter {
    ListFilter::Equals {
        path: "$.status",
        value: FilterValue::Text(status.to_string()),
    }
}

/// Serves a public list body from the cache, building and storing it on a miss.
pub async fn cached<F>(cache: &ListCache, key: String, build: F) -> ApiResult
where
    F: Future<Output = Result<Value, ApiError>>,
{
    let (hit, generation) = cache.get(&key);
    if let Some(body) = hit {
        return raw(body);
    }
    let body = build.await?;
    cache.insert(generation, key, body.clone());
    raw(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn taxonomy_filters_normalise_ids() {
        let query = ListQuery {
            category: Some("01hzx0000000000000000000e1".into()),
            tag: Some("  ".into()),
            ..ListQuery::default()
        };
        let filters = query.taxonomy_filters().expect("filters");
        assert_eq!(
            filters,
            vec![ListFilter::ArrayContains {
                path: "$.category_ids",
                value: "01HZX0000000000000000000E1".into(),
            }]
        );
    }

    #[test]
    fn invalid_reference_and_flags_are_rejected() {
        let query = ListQuery {
            tag: Some("not-an-id".into()),
            featured: Some("maybe".into()),
            status: Some("deleted".into()),
            ..ListQuery::default()
        };
        assert!(matches!(query.taxonomy_filters(), Err(ApiError::BadRequest(_))));
        assert!(matches!(query.featured_filter(), Err(ApiError::BadRequest(_))));
        assert!(matches!(
            query.status_filter(&["new", "read"]),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn status_filter_accepts_allowed_value() {
        let query = ListQuery {
            status: Some("read".into()),
            ..ListQuery::default()
        };
        assert_eq!(
            query.status_filter(&["new", "read"]).expect("filter"),
            Some(status_is("read"))
        );
    }

    #[tokio::test]
    async fn write_during_build_keeps_stale_body_out_of_cache() {
        let cache = ListCache::new(8, Duration::from_secs(60));
        let writer = cache.clone();

        let response = cached(&cache, "tags?limit=12".into(), async move {
            writer.clear();
            Ok(json!({ "success": true, "data": ["old"] }))
        })
        .await
        .expect("response");

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(cache.get("tags?limit=12").0, None);
    }
}
