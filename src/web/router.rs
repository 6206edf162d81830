//! Router configuration for the web surface.

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    delete_file, delete_folder_route, download_file, list_files, upload_file, AppState,
};
use super::pages::{browse, create_folder, index, upload_form};

/// Create the main router: HTML pages, JSON API, and downloads.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Oversize uploads are rejected by the handlers with an explicit 413,
    // so the framework body limit sits above the configured maximum.
    let body_limit = (app_state.max_upload_size as usize).saturating_add(1024 * 1024);

    let page_routes = Router::new()
        .route("/", get(index))
        .route("/browse/*folder", get(browse))
        .route("/upload", post(upload_form))
        .route("/create_folder", post(create_folder));

    let api_routes = Router::new()
        .route("/files", get(list_files).post(upload_file))
        .route("/files/*path", get(download_file).delete(delete_file))
        .route("/folders/*path", delete(delete_folder_route));

    Router::new()
        .merge(page_routes)
        .nest("/api", api_routes)
        .route("/download/*path", get(download_file))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(app_state)
}

/// Create a CORS layer for the JSON API.
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
