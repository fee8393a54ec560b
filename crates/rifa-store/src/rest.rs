// SPDX-License-Identifier: Apache-2.0

use crate::{sha256_hex, CollectionFetch, CreateOutcome, Document, DocumentStore, StoreError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use rifa_model::DocumentFields;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

/// Remote document store spoken over a small REST surface:
///
/// - `GET    {base}/{collection}`        full collection, etag-conditional
/// - `GET    {base}/{collection}/{key}`  one document, 404 when absent
/// - `PUT    {base}/{collection}/{key}`  create with `If-None-Match: *`,
///   412 when the key is already taken
/// - `PATCH  {base}/{collection}/{key}`  field merge, 404 when absent
///
/// Transport errors and 5xx answers are retried with linear backoff;
/// 404 and 412 are outcomes, never retried.
pub struct RestStore {
    base_url: String,
    auth_bearer: Option<String>,
    retry: RetryPolicy,
    allow_private_hosts: bool,
    client: reqwest::Client,
}

impl RestStore {
    #[must_use]
    pub fn new(
        base_url: String,
        auth_bearer: Option<String>,
        retry: RetryPolicy,
        allow_private_hosts: bool,
    ) -> Self {
        // One configured client for the store's lifetime; retries reuse
        // its connection pool.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_bearer,
            retry,
            allow_private_hosts,
            client,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.base_url)
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!("{}/{collection}/{key}", self.base_url)
    }

    fn validate_url(&self, url: &str) -> Result<(), StoreError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid store url: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| StoreError::Unavailable("store url missing host".to_string()))?
            .to_ascii_lowercase();
        if !self.allow_private_hosts && (host == "localhost" || host.ends_with(".localhost")) {
            return Err(StoreError::Unavailable(
                "blocked store host: localhost".to_string(),
            ));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            let private = match ip {
                IpAddr::V4(v4) => {
                    v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_broadcast()
                }
                IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || v6.is_unique_local(),
            };
            if private && !self.allow_private_hosts {
                return Err(StoreError::Unavailable(
                    "blocked private store host".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn base_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| StoreError::Unavailable(format!("invalid auth header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn backoff(&self, attempt: usize) {
        tokio::time::sleep(Duration::from_millis(
            self.retry.base_backoff_ms.saturating_mul(attempt as u64),
        ))
        .await;
    }

    /// Sends the request built by `build` until it yields a non-5xx answer
    /// or the retry budget is spent.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.validate_url(url)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build(&self.client).send().await {
                Ok(resp) if !resp.status().is_server_error() => return Ok(resp),
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError::Unavailable(format!(
                            "request failed status={} url={url}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError::Unavailable(format!(
                            "request failed url={url}: {e}"
                        )));
                    }
                }
            }
            self.backoff(attempt).await;
        }
    }

    async fn read_fields(resp: reqwest::Response) -> Result<DocumentFields, StoreError> {
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::Unavailable(format!("read body failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("document parse failed: {e}")))
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    fn backend_tag(&self) -> &'static str {
        "rest"
    }

    #[instrument(name = "store_rest_get", skip(self))]
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<DocumentFields>, StoreError> {
        let url = self.document_url(collection, key);
        let headers = self.base_headers()?;
        let resp = self
            .send_with_retry(&url, |client| client.get(&url).headers(headers.clone()))
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(Self::read_fields(resp).await?)),
            status => Err(StoreError::Unavailable(format!(
                "get failed status={status} url={url}"
            ))),
        }
    }

    #[instrument(name = "store_rest_create", skip(self, fields))]
    async fn create(
        &self,
        collection: &str,
        key: &str,
        fields: DocumentFields,
    ) -> Result<CreateOutcome, StoreError> {
        let url = self.document_url(collection, key);
        let body = serde_json::to_vec(&fields)
            .map_err(|e| StoreError::Corrupt(format!("document serialize failed: {e}")))?;
        let mut headers = self.base_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        let resp = self
            .send_with_retry(&url, |client| {
                client
                    .put(&url)
                    .headers(headers.clone())
                    .body(body.clone())
            })
            .await?;
        match resp.status() {
            StatusCode::PRECONDITION_FAILED => {
                // The key is taken; fetch the holder for the caller.
                let existing = self.get(collection, key).await?.unwrap_or_default();
                Ok(CreateOutcome::Exists(existing))
            }
            status if status.is_success() => Ok(CreateOutcome::Created),
            status => Err(StoreError::Unavailable(format!(
                "create failed status={status} url={url}"
            ))),
        }
    }

    #[instrument(name = "store_rest_merge", skip(self, patch))]
    async fn merge(
        &self,
        collection: &str,
        key: &str,
        patch: DocumentFields,
    ) -> Result<bool, StoreError> {
        let url = self.document_url(collection, key);
        let body = serde_json::to_vec(&patch)
            .map_err(|e| StoreError::Corrupt(format!("patch serialize failed: {e}")))?;
        let mut headers = self.base_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let resp = self
            .send_with_retry(&url, |client| {
                client
                    .patch(&url)
                    .headers(headers.clone())
                    .body(body.clone())
            })
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StoreError::Unavailable(format!(
                "merge failed status={status} url={url}"
            ))),
        }
    }

    #[instrument(name = "store_rest_fetch_collection", skip(self))]
    async fn fetch_collection(
        &self,
        collection: &str,
        if_none_match: Option<&str>,
    ) -> Result<CollectionFetch, StoreError> {
        let url = self.collection_url(collection);
        let mut headers = self.base_headers()?;
        if let Some(tag) = if_none_match {
            headers.insert(
                IF_NONE_MATCH,
                HeaderValue::from_str(tag).map_err(|e| {
                    StoreError::Unavailable(format!("invalid if-none-match header: {e}"))
                })?,
            );
        }
        let resp = self
            .send_with_retry(&url, |client| client.get(&url).headers(headers.clone()))
            .await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(CollectionFetch::NotModified);
        }
        if !resp.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "collection fetch failed status={} url={url}",
                resp.status()
            )));
        }
        let header_etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::Unavailable(format!("read body failed: {e}")))?;
        let by_key: BTreeMap<String, DocumentFields> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("collection parse failed: {e}")))?;
        let etag = header_etag.unwrap_or_else(|| sha256_hex(&bytes));
        Ok(CollectionFetch::Updated {
            etag,
            docs: by_key
                .into_iter()
                .map(|(key, fields)| Document { key, fields })
                .collect(),
        })
    }
}
