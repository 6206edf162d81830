//! Web API File Tests
//!
//! Integration tests for the file and folder endpoints, running the full
//! router against in-memory backends.

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::Value;
use shelf::storage::memory::{MemoryFlat, MemoryTree};
use shelf::storage::FlatStore;
use shelf::web::handlers::AppState;
use shelf::web::router::{create_health_router, create_router};
use std::sync::Arc;

const TEST_MAX_UPLOAD: u64 = 1024 * 1024;

/// Create a test server over in-memory backends.
fn create_test_server(
    tree: Arc<MemoryTree>,
    flat: Option<Arc<MemoryFlat>>,
) -> TestServer {
    let flat = flat.map(|f| f as Arc<dyn FlatStore>);
    let app_state =
        AppState::new(tree, flat, TEST_MAX_UPLOAD).expect("Failed to create app state");
    let router = create_router(Arc::new(app_state)).merge(create_health_router());
    TestServer::new(router).expect("Failed to create test server")
}

/// Multipart form with a single file part.
fn file_form(filename: &str, content: &[u8], folder: &str) -> MultipartForm {
    MultipartForm::new()
        .add_part(
            "file",
            Part::bytes(content.to_vec())
                .file_name(filename)
                .mime_type("application/octet-stream"),
        )
        .add_text("folder", folder)
}

#[tokio::test]
async fn test_health() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_list_empty_root() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);

    let response = server.get("/api/files").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["folder"], "");
    assert_eq!(body["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_upload_list_download_delete_round_trip() {
    let tree = Arc::new(MemoryTree::new());
    let server = create_test_server(tree.clone(), None);

    // Upload
    let response = server
        .post("/api/files")
        .multipart(file_form("hello.txt", b"hello world", "docs"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "File created");
    assert_eq!(body["path"], "docs/hello.txt");
    assert!(tree.contains("docs/hello.txt"));

    // List
    let response = server.get("/api/files").add_query_param("folder", "docs").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "hello.txt");
    assert_eq!(files[0]["is_dir"], false);
    assert_eq!(files[0]["source"], "repo");
    assert_eq!(files[0]["size"], 11);
    assert_eq!(files[0]["mime_type"], "text/plain");
    assert_eq!(files[0]["download_url"], "/download/docs/hello.txt");

    // Download
    let response = server.get("/download/docs/hello.txt").await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"hello world");
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(disposition.contains("hello.txt"));

    // Delete
    let response = server.delete("/api/files/docs/hello.txt").await;
    response.assert_status_ok();
    assert!(!tree.contains("docs/hello.txt"));

    // Deleting again is a 404
    let response = server.delete("/api/files/docs/hello.txt").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_upload_updates_existing_file() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("notes.txt", b"old");
    let server = create_test_server(tree.clone(), None);

    let response = server
        .post("/api/files")
        .multipart(file_form("notes.txt", b"new", ""))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "File updated");
}

#[tokio::test]
async fn test_upload_sanitizes_filename() {
    let tree = Arc::new(MemoryTree::new());
    let server = create_test_server(tree.clone(), None);

    let response = server
        .post("/api/files")
        .multipart(file_form("../../evil.txt", b"x", "docs"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["path"], "docs/evil.txt");
    assert!(tree.contains("docs/evil.txt"));
}

#[tokio::test]
async fn test_upload_traversal_folder_is_rejected() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);

    let response = server
        .post("/api/files")
        .multipart(file_form("f.txt", b"x", "../escape"))
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);

    let response = server
        .post("/api/files")
        .multipart(MultipartForm::new().add_text("folder", "docs"))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_upload_over_limit_is_413() {
    let tree = Arc::new(MemoryTree::new());
    let server = create_test_server(tree.clone(), None);

    let oversized = vec![0u8; TEST_MAX_UPLOAD as usize + 1];
    let response = server
        .post("/api/files")
        .multipart(file_form("big.bin", &oversized, ""))
        .await;
    response.assert_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    // Nothing was committed
    assert!(tree.keys().is_empty());
}

#[tokio::test]
async fn test_download_missing_is_404() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);

    let response = server.get("/download/ghost.txt").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_download_traversal_path_is_400() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("secret.txt", b"s");
    let server = create_test_server(tree, None);

    // Percent-encode the slashes so the test client's URL parser does not
    // normalize away the `..` segment before the request reaches the server;
    // axum's Path extractor decodes this back to `docs/../secret.txt`.
    let response = server.get("/download/docs%2F..%2Fsecret.txt").await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_delete_file_present_only_in_bucket() {
    let tree = Arc::new(MemoryTree::new());
    let flat = Arc::new(MemoryFlat::new());
    flat.seed("docs/b.txt", b"bucket only");
    let server = create_test_server(tree, Some(flat.clone()));

    let response = server.delete("/api/files/docs/b.txt").await;
    response.assert_status_ok();
    assert!(!flat.contains("docs/b.txt"));
}

#[tokio::test]
async fn test_delete_missing_file_with_bucket_is_404() {
    let tree = Arc::new(MemoryTree::new());
    let flat = Arc::new(MemoryFlat::new());
    let server = create_test_server(tree, Some(flat));

    // Absent from both backends: the batched bucket remove must not be
    // mistaken for a deletion.
    let response = server.delete("/api/files/ghost.txt").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_delete_missing_file_ignores_prefix_similar_bucket_keys() {
    let tree = Arc::new(MemoryTree::new());
    let flat = Arc::new(MemoryFlat::new());
    flat.seed("report.pdf.bak", b"x");
    let server = create_test_server(tree, Some(flat.clone()));

    let response = server.delete("/api/files/report.pdf").await;
    response.assert_status_not_found();
    assert!(flat.contains("report.pdf.bak"));
}

#[tokio::test]
async fn test_delete_file_removes_from_both_backends() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("shared.txt", b"t");
    let flat = Arc::new(MemoryFlat::new());
    flat.seed("shared.txt", b"f");
    let server = create_test_server(tree.clone(), Some(flat.clone()));

    let response = server.delete("/api/files/shared.txt").await;
    response.assert_status_ok();
    assert!(!tree.contains("shared.txt"));
    assert!(!flat.contains("shared.txt"));
}

#[tokio::test]
async fn test_delete_folder_recursive_across_backends() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("docs/.gitkeep", b"");
    tree.seed("docs/a.txt", b"1");
    tree.seed("docs/sub/b.txt", b"2");
    tree.seed("keep/c.txt", b"3");
    let flat = Arc::new(MemoryFlat::new());
    flat.seed("docs/extra.bin", b"4");
    flat.seed("keep/d.bin", b"5");
    let server = create_test_server(tree.clone(), Some(flat.clone()));

    let response = server.delete("/api/folders/docs").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["files_deleted"], 2);
    assert_eq!(body["markers_deleted"], 1);
    assert_eq!(body["bucket_objects_deleted"], 1);
    assert_eq!(body["failures"], 0);

    assert_eq!(tree.keys(), vec!["keep/c.txt"]);
    assert_eq!(flat.keys(), vec!["keep/d.bin"]);
}

#[tokio::test]
async fn test_delete_folder_is_idempotent() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("docs/a.txt", b"1");
    let server = create_test_server(tree, None);

    let response = server.delete("/api/folders/docs").await;
    response.assert_status_ok();

    // Second call succeeds with nothing left to delete.
    let response = server.delete("/api/folders/docs").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["files_deleted"], 0);
    assert_eq!(body["markers_deleted"], 0);
    assert_eq!(body["failures"], 0);
}

#[tokio::test]
async fn test_delete_folder_continues_past_failures() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("docs/bad.txt", b"1");
    tree.seed("docs/good.txt", b"2");
    tree.fail_delete("docs/bad.txt");
    let server = create_test_server(tree.clone(), None);

    let response = server.delete("/api/folders/docs").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["files_deleted"], 1);
    assert_eq!(body["failures"], 1);
    assert!(tree.contains("docs/bad.txt"));
    assert!(!tree.contains("docs/good.txt"));
}

#[tokio::test]
async fn test_delete_root_folder_is_rejected() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("a.txt", b"1");
    let server = create_test_server(tree.clone(), None);

    let response = server.delete("/api/folders/%20").await;
    response.assert_status_bad_request();
    assert!(tree.contains("a.txt"));
}

#[tokio::test]
async fn test_browse_page_lists_files() {
    let tree = Arc::new(MemoryTree::new());
    tree.seed("docs/report.pdf", b"pdf");
    let server = create_test_server(tree, None);

    let response = server.get("/browse/docs").await;
    response.assert_status_ok();
    let page = response.text();
    assert!(page.contains("report.pdf"));
    assert!(page.contains("/download/docs/report.pdf"));
}

#[tokio::test]
async fn test_index_page_shows_flash_message() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);

    let response = server
        .get("/")
        .add_query_param("msg", "File uploaded.")
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("File uploaded."));
}

#[tokio::test]
async fn test_form_upload_redirects_with_flash() {
    let tree = Arc::new(MemoryTree::new());
    let server = create_test_server(tree.clone(), None);

    let response = server
        .post("/upload")
        .multipart(file_form("photo.png", b"png-bytes", "pics"))
        .await;
    response.assert_status(axum::http::StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("/browse/pics"));
    assert!(location.contains("msg="));
    assert!(tree.contains("pics/photo.png"));
}

#[tokio::test]
async fn test_form_upload_error_flashes_back_to_referring_folder() {
    let server = create_test_server(Arc::new(MemoryTree::new()), None);

    // Unreadable multipart body: the folder field is lost, so the redirect
    // falls back to the page named by the Referer header.
    let response = server
        .post("/upload")
        .add_header(
            axum::http::header::REFERER,
            axum::http::HeaderValue::from_static("http://localhost:8080/browse/docs"),
        )
        .text("not a multipart body")
        .content_type("multipart/form-data; boundary=xyz")
        .await;

    response.assert_status(axum::http::StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("/browse/docs?msg="));
}

#[tokio::test]
async fn test_create_folder_commits_marker() {
    let tree = Arc::new(MemoryTree::new());
    let server = create_test_server(tree.clone(), None);

    let response = server
        .post("/create_folder")
        .form(&[("name", "reports"), ("folder", "docs")])
        .await;
    response.assert_status(axum::http::StatusCode::SEE_OTHER);
    assert!(tree.contains("docs/reports/.gitkeep"));

    // The new folder shows up as an empty directory listing.
    let response = server
        .get("/api/files")
        .add_query_param("folder", "docs/reports")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["files"].as_array().unwrap().len(), 0);
}
