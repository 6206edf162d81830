//! API handlers for the shelf web surface.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::storage::{
    delete_folder, delete_prefix, merge_listing, normalize, normalize_folder, Entry, FlatStore,
    PutOutcome, StorageKey, TreeStore,
};
use crate::web::error::ApiError;
use crate::{Result, ShelfError};

/// Connect timeout for upload-from-URL fetches, in seconds.
const FETCH_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout for upload-from-URL fetches, in seconds.
const FETCH_TOTAL_TIMEOUT_SECS: u64 = 60;

/// Redirect cap for upload-from-URL fetches.
const FETCH_MAX_REDIRECTS: usize = 5;

/// Shared application state.
///
/// Adapter handles are read-only configuration, safe to share across
/// concurrent requests without locking.
pub struct AppState {
    /// Commit-based primary backend.
    pub tree: Arc<dyn TreeStore>,
    /// Optional flat-key-space secondary backend.
    pub flat: Option<Arc<dyn FlatStore>>,
    /// Maximum accepted upload size in bytes.
    pub max_upload_size: u64,
    /// Shared HTTP client for upload-from-URL fetches.
    pub fetch_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        tree: Arc<dyn TreeStore>,
        flat: Option<Arc<dyn FlatStore>>,
        max_upload_size: u64,
    ) -> Result<Self> {
        let fetch_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(FETCH_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(FETCH_TOTAL_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(FETCH_MAX_REDIRECTS))
            .build()
            .map_err(|e| ShelfError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            tree,
            flat,
            max_upload_size,
            fetch_client,
        })
    }

    fn flat_ref(&self) -> Option<&dyn FlatStore> {
        self.flat.as_deref()
    }
}

/// Query parameters for the listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Folder to list; the storage root when absent.
    #[serde(default)]
    pub folder: String,
}

/// Listing response.
#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub folder: String,
    pub files: Vec<Entry>,
}

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub path: String,
}

/// Folder delete response.
#[derive(Debug, Serialize)]
pub struct FolderDeleteResponse {
    pub message: String,
    pub files_deleted: usize,
    pub markers_deleted: usize,
    pub bucket_objects_deleted: usize,
    pub failures: usize,
}

/// Parsed multipart upload form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub filename: Option<String>,
    pub content: Option<Vec<u8>>,
    pub folder: String,
    pub source_url: Option<String>,
}

/// Read the upload form fields out of a multipart body.
pub async fn parse_upload(mut multipart: Multipart) -> std::result::Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to read file content: {}", e);
                        ApiError::bad_request("Failed to read file")
                    })?
                    .to_vec();
                // Browsers send an empty file part when nothing is selected.
                if filename.as_deref().unwrap_or("").is_empty() && bytes.is_empty() {
                    continue;
                }
                form.filename = filename;
                form.content = Some(bytes);
            }
            "folder" => {
                form.folder = field.text().await.map_err(|e| {
                    tracing::error!("Failed to read folder field: {}", e);
                    ApiError::bad_request("Invalid folder field")
                })?;
            }
            "url" => {
                let url = field.text().await.map_err(|e| {
                    tracing::error!("Failed to read url field: {}", e);
                    ApiError::bad_request("Invalid url field")
                })?;
                if !url.trim().is_empty() {
                    form.source_url = Some(url.trim().to_string());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Reject URLs that could reach internal addresses.
fn validate_source_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| ShelfError::InvalidPath(format!("invalid source URL: {e}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ShelfError::InvalidPath(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ShelfError::InvalidPath("source URL has no host".to_string()))?;

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        let blocked = match ip {
            IpAddr::V4(v4) => {
                v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
            }
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
        if blocked {
            return Err(ShelfError::InvalidPath(format!(
                "source URL resolves to a blocked address: {host}"
            )));
        }
    }

    Ok(parsed)
}

/// Fetch an upload source from a remote URL, enforcing the size limit.
pub async fn fetch_source(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
) -> Result<(String, Vec<u8>)> {
    let parsed = validate_source_url(url)?;

    let filename = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or("download")
        .to_string();

    let response = client.get(parsed).send().await.map_err(|e| {
        if e.is_timeout() {
            ShelfError::Timeout(e.to_string())
        } else {
            ShelfError::Provider(format!("failed to fetch source URL: {e}"))
        }
    })?;

    if !response.status().is_success() {
        return Err(ShelfError::Provider(format!(
            "source URL returned {}",
            response.status()
        )));
    }

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            return Err(ShelfError::PayloadTooLarge {
                size: length,
                limit: max_bytes,
            });
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ShelfError::Provider(format!("failed to read source URL: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(ShelfError::PayloadTooLarge {
            size: bytes.len() as u64,
            limit: max_bytes,
        });
    }

    Ok((filename, bytes.to_vec()))
}

/// Normalize, size-check, and commit one upload to the primary backend.
pub async fn store_upload(
    state: &AppState,
    filename: &str,
    folder: &str,
    content: &[u8],
) -> Result<(StorageKey, PutOutcome)> {
    // Size is checked before any upstream call.
    if content.len() as u64 > state.max_upload_size {
        return Err(ShelfError::PayloadTooLarge {
            size: content.len() as u64,
            limit: state.max_upload_size,
        });
    }

    let key = normalize(filename, folder)?;
    let message = format!("Upload {key} @ {}", Utc::now().to_rfc3339());
    let outcome = state.tree.put(key.as_str(), content, &message).await?;
    Ok((key, outcome))
}

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are removed to prevent header injection; non-ASCII
/// names additionally get an RFC 5987 `filename*` parameter.
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{filename}\"");
    }

    let encoded = urlencoding::encode(filename);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// GET /api/files - List a folder as JSON.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> std::result::Result<Json<FilesResponse>, ApiError> {
    let folder = normalize_folder(&query.folder)?;
    let files = merge_listing(state.tree.as_ref(), state.flat_ref(), &folder).await;
    Ok(Json(FilesResponse { folder, files }))
}

/// POST /api/files - Upload a file.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Json<UploadResponse>, ApiError> {
    let form = parse_upload(multipart).await?;

    let (filename, content) = match (form.filename, form.content, form.source_url) {
        (Some(name), Some(bytes), _) => (name, bytes),
        (_, _, Some(url)) => fetch_source(&state.fetch_client, &url, state.max_upload_size).await?,
        _ => return Err(ApiError::bad_request("No file provided")),
    };

    let (key, outcome) = store_upload(&state, &filename, &form.folder, &content).await?;
    let message = match outcome {
        PutOutcome::Created => "File created",
        PutOutcome::Updated => "File updated",
    };

    tracing::info!(key = %key, size = content.len(), "uploaded file");
    Ok(Json(UploadResponse {
        message: message.to_string(),
        path: key.into_string(),
    }))
}

/// GET /api/files/{path} and GET /download/{path} - Download a file.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> std::result::Result<Response<Body>, ApiError> {
    let key = StorageKey::parse(&path)?;
    let file = state.tree.read(key.as_str()).await?;

    let content_type = mime_guess::from_path(&file.name)
        .first_or_octet_stream()
        .to_string();

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&file.name),
        )
        .header(header::CONTENT_LENGTH, file.bytes.len())
        .body(Body::from(file.bytes))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// DELETE /api/files/{path} - Delete one file from both backends.
///
/// The bucket removal is best-effort: one backend not knowing the key is
/// fine as long as some backend did. 404 only when neither backend had it.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> std::result::Result<Json<UploadResponse>, ApiError> {
    let key = StorageKey::parse(&path)?;
    let message = format!("Deleted {key}");

    let mut deleted_tree = false;
    match state.tree.delete(key.as_str(), &message).await {
        Ok(()) => deleted_tree = true,
        Err(ShelfError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    // A batched remove is a silent no-op for absent keys, so the bucket leg
    // only counts as a deletion when the object verifiably existed.
    let mut deleted_flat = false;
    if let Some(flat) = state.flat_ref() {
        match flat.list(key.as_str()).await {
            Ok(objects) if objects.iter().any(|o| o.key == key.as_str()) => {
                match flat.remove(&[key.as_str().to_string()]).await {
                    Ok(()) => deleted_flat = true,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "bucket removal failed, continuing");
                    }
                }
            }
            Ok(_) | Err(ShelfError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "bucket lookup failed, continuing");
            }
        }
    }

    if !deleted_tree && !deleted_flat {
        return Err(ApiError::not_found(format!("{key} not found")));
    }

    tracing::info!(key = %key, "deleted file");
    Ok(Json(UploadResponse {
        message: format!("{key} deleted"),
        path: key.into_string(),
    }))
}

/// DELETE /api/folders/{path} - Recursively delete a folder from both
/// backends. Idempotent: an absent folder is a success with zero deletions.
pub async fn delete_folder_route(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> std::result::Result<Json<FolderDeleteResponse>, ApiError> {
    let folder = normalize_folder(&path)?;
    if folder.is_empty() {
        return Err(ApiError::bad_request("Cannot delete the storage root"));
    }

    let stats = delete_folder(state.tree.as_ref(), &folder).await;

    let mut bucket_objects_deleted = 0;
    let mut failures = stats.failures;
    if let Some(flat) = state.flat_ref() {
        match delete_prefix(flat, &folder).await {
            Ok(count) => bucket_objects_deleted = count,
            Err(e) => {
                tracing::warn!(folder = %folder, error = %e, "bucket prefix delete failed");
                failures += 1;
            }
        }
    }

    tracing::info!(
        folder = %folder,
        files = stats.files_deleted,
        bucket_objects = bucket_objects_deleted,
        failures,
        "deleted folder"
    );

    Ok(Json(FolderDeleteResponse {
        message: format!("{folder} deleted"),
        files_deleted: stats.files_deleted,
        markers_deleted: stats.markers_deleted,
        bucket_objects_deleted,
        failures,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryTree;

    #[test]
    fn test_app_state_builds_shared_fetch_client() {
        let state = AppState::new(Arc::new(MemoryTree::new()), None, 42).expect("app state");
        assert_eq!(state.max_upload_size, 42);
        // One client handle, cloned per request rather than rebuilt.
        let _ = state.fetch_client.clone();
    }

    #[test]
    fn test_content_disposition_simple_ascii() {
        assert_eq!(
            content_disposition_header("document.txt"),
            "attachment; filename=\"document.txt\""
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let result = content_disposition_header("日本語.txt");
        assert!(result.starts_with("attachment; filename=\""));
        assert!(result.contains("filename*=UTF-8''"));
    }

    #[test]
    fn test_content_disposition_header_injection() {
        let result = content_disposition_header("x\r\nX-Evil: yes.txt");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
    }

    #[test]
    fn test_validate_source_url_schemes() {
        assert!(validate_source_url("https://example.com/a.txt").is_ok());
        assert!(validate_source_url("http://example.com/a.txt").is_ok());
        assert!(validate_source_url("ftp://example.com/a.txt").is_err());
        assert!(validate_source_url("file:///etc/passwd").is_err());
        assert!(validate_source_url("not a url").is_err());
    }

    #[test]
    fn test_validate_source_url_blocks_internal_addresses() {
        assert!(validate_source_url("http://127.0.0.1/x").is_err());
        assert!(validate_source_url("http://10.0.0.5/x").is_err());
        assert!(validate_source_url("http://192.168.1.1/x").is_err());
        assert!(validate_source_url("http://169.254.169.254/latest").is_err());
        assert!(validate_source_url("http://[::1]/x").is_err());
        assert!(validate_source_url("http://0.0.0.0/x").is_err());
        assert!(validate_source_url("http://8.8.8.8/x").is_ok());
    }
}
