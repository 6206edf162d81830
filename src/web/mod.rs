//! Web surface: HTML browse pages, JSON file API, and download proxy.

pub mod error;
pub mod handlers;
pub mod pages;
pub mod router;
pub mod server;

pub use error::{ApiError, ErrorCode};
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
