use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use url::Url;

use storefront_core::{DocumentId, Page, PageRequest};

/// Typed client for the public storefront JSON API.
#[derive(Clone)]
pub struct StorefrontClient {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    pagination: Option<PaginationMeta>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaginationMeta {
    next_cursor: Option<DocumentId>,
    has_more: bool,
}

impl StorefrontClient {
    /// `base_url` is treated as a directory, so `https://host/shop` serves
    /// `https://host/shop/api/...`.
    pub fn new(mut base_url: Url, http: Client) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    /// Fetches one page of `resource` (for example `"products"`).
    pub async fn list_page<T>(
        &self,
        resource: &str,
        request: &PageRequest,
    ) -> Result<Page<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        self.list_page_filtered(resource, request, &[]).await
    }

    /// Like [`Self::list_page`] with extra query filters such as `("category", id)`.
    pub async fn list_page_filtered<T>(
        &self,
        resource: &str,
        request: &PageRequest,
        filters: &[(&str, &str)],
    ) -> Result<Page<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let mut url = self.resource_url(resource)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(cursor) = &request.cursor {
                query.append_pair("cursor", cursor.as_str());
            }
            query.append_pair("limit", &request.limit.to_string());
            query.append_pair("sort", request.sort.as_str());
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }

        let envelope: Envelope<Vec<T>> = self.fetch(url).await?;
        let items = envelope.data.unwrap_or_default();
        let meta = envelope.pagination.ok_or(ClientError::MissingPagination)?;
        Ok(Page {
            items,
            next_cursor: meta.next_cursor,
            has_more: meta.has_more,
        })
    }

    /// Fetches a single document of `resource` by id.
    pub async fn get<T>(&self, resource: &str, id: &DocumentId) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let url = self.resource_url(&format!("{resource}/{id}"))?;
        let envelope: Envelope<T> = self.fetch(url).await?;
        envelope.data.ok_or(ClientError::MissingData)
    }

    fn resource_url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(&format!("api/{}", path.trim_start_matches('/')))?)
    }

    async fn fetch<T>(&self, url: Url) -> Result<Envelope<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) if envelope.success && status.is_success() => Ok(envelope),
            Ok(envelope) => Err(ClientError::Api {
                status,
                message: envelope
                    .message
                    .unwrap_or_else(|| "request failed".to_string()),
            }),
            Err(_) if !status.is_success() => Err(ClientError::Status { status, body }),
            Err(err) => Err(ClientError::Decode(err)),
        }
    }
}

/// Errors produced by [`StorefrontClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("response is missing data")]
    MissingData,
    #[error("list response is missing pagination")]
    MissingPagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
        name: String,
    }

    const FIRST: &str = "01HZX0000000000000000000A1";
    const SECOND: &str = "01HZX0000000000000000000A2";

    fn client(server: &MockServer) -> StorefrontClient {
        StorefrontClient::new(
            Url::parse(&server.base_url()).expect("url"),
            Client::builder().build().expect("client"),
        )
    }

    #[tokio::test]
    async fn list_page_sends_paging_params_and_decodes_envelope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/products")
                    .query_param("cursor", FIRST)
                    .query_param("limit", "2")
                    .query_param("sort", "asc")
                    .query_param("tag", "t1");
                then.status(200).json_body(json!({
                    "success": true,
                    "data": [{ "id": SECOND, "name": "Mug" }],
                    "pagination": { "next_cursor": SECOND, "has_more": true, "limit": 2 }
                }));
            })
            .await;

        let request = PageRequest::from_params(Some(FIRST), Some("2"), Some("asc")).expect("req");
        let page: Page<Item> = client(&server)
            .list_page_filtered("products", &request, &[("tag", "t1")])
            .await
            .expect("page");

        mock.assert_async().await;
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Mug");
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_ref().map(DocumentId::as_str), Some(SECOND));
    }

    #[tokio::test]
    async fn failure_envelope_becomes_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/api/products/{FIRST}"));
                then.status(404)
                    .json_body(json!({ "success": false, "message": "product not found" }));
            })
            .await;

        let id = DocumentId::parse(FIRST).expect("id");
        let err = client(&server)
            .get::<Item>("products", &id)
            .await
            .expect_err("not found");
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "product not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_json_error_keeps_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(502).body("bad gateway");
            })
            .await;

        let err = client(&server)
            .list_page::<Item>("tags", &PageRequest::default())
            .await
            .expect_err("should error");
        assert!(matches!(
            err,
            ClientError::Status { status, ref body } if status == StatusCode::BAD_GATEWAY && body == "bad gateway"
        ));
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_kept() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/shop/api/tags");
                then.status(200).json_body(json!({
                    "success": true,
                    "data": [],
                    "pagination": { "next_cursor": null, "has_more": false, "limit": 12 }
                }));
            })
            .await;

        let base = Url::parse(&format!("{}/shop", server.base_url())).expect("url");
        let client = StorefrontClient::new(base, Client::builder().build().expect("client"));
        let page = client
            .list_page::<Item>("tags", &PageRequest::default())
            .await
            .expect("page");

        mock.assert_async().await;
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }
}
