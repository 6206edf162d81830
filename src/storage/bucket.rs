//! Object-storage bucket adapter.
//!
//! Implements [`FlatStore`] against a Supabase-style storage HTTP API. The
//! bucket has no directory concept: listings return flat keys, and the
//! merger upstream turns key prefixes into synthetic folders.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::config::BucketConfig;
use crate::storage::backend::{FlatObject, FlatStore};
use crate::{Result, ShelfError};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 30;

/// Page size for list calls.
const LIST_PAGE_SIZE: usize = 1000;

/// One record of a bucket list response.
#[derive(Debug, Deserialize)]
struct ObjectRecord {
    name: String,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mimetype: Option<String>,
}

/// Error body shape of the storage API.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// Flat-key-space bucket client.
#[derive(Debug, Clone)]
pub struct BucketClient {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl BucketClient {
    /// Create a new client from configuration.
    pub fn new(config: &BucketConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ShelfError::Config(format!("invalid bucket api key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| ShelfError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        })
    }

    fn transport_error(e: reqwest::Error) -> ShelfError {
        if e.is_timeout() {
            ShelfError::Timeout(e.to_string())
        } else {
            ShelfError::Provider(e.to_string())
        }
    }

    async fn response_error(context: &str, response: reqwest::Response) -> ShelfError {
        let status = response.status();
        let message = response
            .json::<ApiMessage>()
            .await
            .map(|m| m.message)
            .unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => ShelfError::NotFound(context.to_string()),
            _ => ShelfError::Provider(format!("storage API {status}: {message}")),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait::async_trait]
impl FlatStore for BucketClient {
    async fn list(&self, prefix: &str) -> Result<Vec<FlatObject>> {
        let mut objects = Vec::new();
        let mut offset = 0usize;

        loop {
            let body = serde_json::json!({
                "prefix": prefix,
                "limit": LIST_PAGE_SIZE,
                "offset": offset,
                "sortBy": { "column": "name", "order": "asc" },
            });

            let response = self
                .client
                .post(format!("{}/object/list/{}", self.endpoint, self.bucket))
                .json(&body)
                .send()
                .await
                .map_err(Self::transport_error)?;

            if !response.status().is_success() {
                return Err(Self::response_error(prefix, response).await);
            }

            let page: Vec<ObjectRecord> = response
                .json()
                .await
                .map_err(|e| ShelfError::Provider(format!("invalid list response: {e}")))?;
            let page_len = page.len();

            objects.extend(page.into_iter().map(|record| FlatObject {
                key: record.name,
                size: record.metadata.as_ref().and_then(|m| m.size),
                content_type: record.metadata.and_then(|m| m.mimetype),
            }));

            if page_len < LIST_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        Ok(objects)
    }

    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let response = self
            .client
            .post(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::response_error(key, response).await);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let body = serde_json::json!({ "prefixes": keys });
        let response = self
            .client
            .delete(format!("{}/object/{}", self.endpoint, self.bucket))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::response_error("batch remove", response).await);
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/object/public/{}/{}", self.endpoint, self.bucket, key)
    }
}
