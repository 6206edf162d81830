//! Git hosting contents-API adapter.
//!
//! Implements [`TreeStore`] against a GitHub-style repository contents API.
//! Every read and write is scoped to one branch and one root prefix inside
//! the repository; every write is a commit carrying a human-readable
//! message. Updates and deletes require the current revision token (`sha`)
//! of the object being replaced, which this adapter probes for.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::config::RepoConfig;
use crate::storage::backend::{EntryKind, FileContent, PutOutcome, TreeEntry, TreeStore};
use crate::storage::FOLDER_MARKER;
use crate::{Result, ShelfError};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read timeout in seconds.
const READ_TIMEOUT_SECS: u64 = 20;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 30;

/// User agent string; the contents API rejects requests without one.
const USER_AGENT: &str = "shelf/0.1";

/// One item of a contents-API response.
#[derive(Debug, Deserialize)]
struct ContentsItem {
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

/// Error body shape of the contents API.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// Commit-based repository contents client.
#[derive(Debug, Clone)]
pub struct RepoClient {
    client: Client,
    api_base: String,
    repository: String,
    branch: String,
    root: String,
}

impl RepoClient {
    /// Create a new client from configuration.
    pub fn new(config: &RepoConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| ShelfError::Config(format!("invalid repo token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ShelfError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            branch: config.branch.clone(),
            root: config.root.trim_matches('/').to_string(),
        })
    }

    /// Contents URL for a storage-relative key (empty key addresses the root).
    fn contents_url(&self, key: &str) -> String {
        let mut path = self.root.clone();
        if !key.is_empty() {
            if path.is_empty() {
                path = key.to_string();
            } else {
                path = format!("{path}/{key}");
            }
        }
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base, self.repository, path
        )
    }

    /// Strip the root prefix off a repository path, yielding a storage key.
    fn relative_path(&self, repo_path: &str) -> String {
        if self.root.is_empty() {
            return repo_path.to_string();
        }
        repo_path
            .strip_prefix(&format!("{}/", self.root))
            .unwrap_or(repo_path)
            .to_string()
    }

    fn transport_error(e: reqwest::Error) -> ShelfError {
        if e.is_timeout() {
            ShelfError::Timeout(e.to_string())
        } else {
            ShelfError::Provider(e.to_string())
        }
    }

    /// Map a non-success contents-API response to the error taxonomy.
    async fn response_error(key: &str, response: reqwest::Response) -> ShelfError {
        let status = response.status();
        let message = response
            .json::<ApiMessage>()
            .await
            .map(|m| m.message)
            .unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => ShelfError::NotFound(key.to_string()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                ShelfError::Conflict(if message.is_empty() {
                    format!("write conflict on {key}")
                } else {
                    message
                })
            }
            _ => ShelfError::Provider(format!("contents API {status}: {message}")),
        }
    }

    /// Fetch the contents of a key as raw JSON (object for a file, array for
    /// a folder).
    async fn get_contents(&self, key: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.contents_url(key))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::response_error(key, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ShelfError::Provider(format!("invalid contents response: {e}")))
    }

    /// Probe for an existing object's revision token.
    ///
    /// `None` when the key is absent or names a folder.
    async fn probe_sha(&self, key: &str) -> Result<Option<String>> {
        match self.get_contents(key).await {
            Ok(serde_json::Value::Object(obj)) => Ok(obj
                .get("sha")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())),
            Ok(_) => Ok(None),
            Err(ShelfError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// One create-or-update attempt.
    async fn put_once(
        &self,
        key: &str,
        bytes: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<PutOutcome> {
        let mut body = serde_json::json!({
            "message": message,
            "content": BASE64.encode(bytes),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self
            .client
            .put(self.contents_url(key))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::response_error(key, response).await);
        }

        Ok(if sha.is_some() {
            PutOutcome::Updated
        } else {
            PutOutcome::Created
        })
    }
}

#[async_trait::async_trait]
impl TreeStore for RepoClient {
    async fn list(&self, prefix: &str) -> Result<Vec<TreeEntry>> {
        let value = self.get_contents(prefix).await?;

        let items: Vec<ContentsItem> = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| ShelfError::Provider(format!("invalid listing: {e}")))?,
            // A file at the prefix: the API returns a single object.
            serde_json::Value::Object(_) => vec![serde_json::from_value(value)
                .map_err(|e| ShelfError::Provider(format!("invalid listing: {e}")))?],
            other => {
                return Err(ShelfError::Provider(format!(
                    "unexpected listing shape: {other}"
                )))
            }
        };

        Ok(items
            .into_iter()
            .filter(|item| item.name != FOLDER_MARKER)
            .map(|item| {
                let kind = if item.kind == "dir" {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                };
                TreeEntry {
                    path: self.relative_path(&item.path),
                    name: item.name,
                    kind,
                    size: item.size,
                }
            })
            .collect())
    }

    async fn read(&self, key: &str) -> Result<FileContent> {
        let value = self.get_contents(key).await?;
        let item: ContentsItem = match value {
            serde_json::Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| ShelfError::Provider(format!("invalid file response: {e}")))?,
            // A folder: there is no file at this key.
            _ => return Err(ShelfError::NotFound(key.to_string())),
        };

        let encoded = item
            .content
            .ok_or_else(|| ShelfError::Provider(format!("no content returned for {key}")))?;
        // The API wraps base64 payloads with newlines.
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| ShelfError::Provider(format!("invalid base64 content: {e}")))?;

        Ok(FileContent {
            name: item.name,
            bytes,
        })
    }

    async fn put(&self, key: &str, bytes: &[u8], message: &str) -> Result<PutOutcome> {
        let sha = self.probe_sha(key).await?;
        match self.put_once(key, bytes, message, sha.as_deref()).await {
            // Stale revision: re-probe and retry exactly once.
            Err(ShelfError::Conflict(first)) => {
                tracing::warn!(key, error = %first, "write conflict, retrying with fresh revision");
                let sha = self.probe_sha(key).await?;
                self.put_once(key, bytes, message, sha.as_deref()).await
            }
            other => other,
        }
    }

    async fn delete(&self, key: &str, message: &str) -> Result<()> {
        let sha = self
            .probe_sha(key)
            .await?
            .ok_or_else(|| ShelfError::NotFound(key.to_string()))?;

        let body = serde_json::json!({
            "message": message,
            "sha": sha,
            "branch": self.branch,
        });

        let response = self
            .client
            .delete(self.contents_url(key))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::response_error(key, response).await);
        }
        Ok(())
    }
}
