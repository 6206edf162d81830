//! Web server for shelf.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::storage::{BucketClient, RepoClient};
use crate::{Result, ShelfError};

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// Web server for the file manager.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
}

impl WebServer {
    /// Create a web server with already-built adapters.
    pub fn new(addr: SocketAddr, app_state: Arc<AppState>) -> Self {
        Self { addr, app_state }
    }

    /// Create a web server from configuration.
    ///
    /// The repository backend is mandatory; the bucket backend is attached
    /// only when its section is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| ShelfError::Config(format!("invalid server address: {e}")))?;

        let tree = Arc::new(RepoClient::new(&config.repo)?);

        let flat = match &config.bucket {
            Some(bucket) => {
                tracing::info!(bucket = %bucket.bucket, "bucket backend enabled");
                Some(Arc::new(BucketClient::new(bucket)?) as Arc<dyn crate::storage::FlatStore>)
            }
            None => {
                tracing::info!("no bucket backend configured, serving repository only");
                None
            }
        };

        let app_state = AppState::new(tree, flat, config.upload.max_upload_size_bytes())?;
        Ok(Self::new(addr, Arc::new(app_state)))
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn build_router(self) -> axum::Router {
        create_router(self.app_state).merge(create_health_router())
    }

    /// Run the web server.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.addr;
        let router = self.build_router();

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let addr = self.addr;
        let router = self.build_router();

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
