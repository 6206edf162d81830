//! shelf - web file manager over repository and bucket storage
//!
//! Serves a browsable file tree backed by a Git-hosting repository
//! contents API, optionally merged with an object-storage bucket.

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod web;

pub use config::Config;
pub use error::{Result, ShelfError};
pub use storage::{
    merge_listing, BucketClient, Entry, EntrySource, FlatStore, RepoClient, StorageKey, TreeStore,
};
pub use web::WebServer;
