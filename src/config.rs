//! Configuration module for shelf.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, ShelfError};

/// Environment variable that overrides the repository API token.
pub const REPO_TOKEN_ENV: &str = "SHELF_REPO_TOKEN";

/// Environment variable that overrides the bucket API key.
pub const BUCKET_KEY_ENV: &str = "SHELF_BUCKET_KEY";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Git hosting repository backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// API token used for all contents-API calls.
    #[serde(default)]
    pub token: String,
    /// Repository in `owner/name` form.
    #[serde(default)]
    pub repository: String,
    /// Branch every read and commit is scoped to.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Key prefix all managed files live under.
    #[serde(default = "default_root")]
    pub root: String,
    /// Contents API base URL. Overridable for tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_root() -> String {
    "storage".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            repository: String::new(),
            branch: default_branch(),
            root: default_root(),
            api_base: default_api_base(),
        }
    }
}

/// Object-storage bucket backend configuration (optional secondary backend).
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Storage API endpoint, e.g. `https://xyz.supabase.co/storage/v1`.
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// API key sent as a bearer token.
    #[serde(default)]
    pub api_key: String,
}

/// Upload limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_max_upload_size() -> u64 {
    50
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

impl UploadConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path. Console-only when absent.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Repository backend configuration.
    #[serde(default)]
    pub repo: RepoConfig,
    /// Optional bucket backend configuration.
    #[serde(default)]
    pub bucket: Option<BucketConfig>,
    /// Upload limits.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| ShelfError::Config(format!("failed to parse config: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides for secrets.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(REPO_TOKEN_ENV) {
            if !token.is_empty() {
                self.repo.token = token;
            }
        }
        if let Ok(key) = std::env::var(BUCKET_KEY_ENV) {
            if !key.is_empty() {
                if let Some(bucket) = self.bucket.as_mut() {
                    bucket.api_key = key;
                }
            }
        }
    }

    /// Validate that the required repository settings are present.
    pub fn validate(&self) -> Result<()> {
        if self.repo.token.is_empty() {
            return Err(ShelfError::Config(format!(
                "repo.token is required (or set {REPO_TOKEN_ENV})"
            )));
        }
        if self.repo.repository.is_empty() {
            return Err(ShelfError::Config(
                "repo.repository is required (owner/name)".to_string(),
            ));
        }
        Ok(())
    }
}
