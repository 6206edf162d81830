//! Storage layer for shelf.
//!
//! Two independent remote backends hold the actual bytes:
//!
//! - a tree-structured, commit-based Git contents API ([`repo`]), and
//! - an optional flat-key-space object-storage bucket ([`bucket`]).
//!
//! [`merge`] reconciles both views into one listing; [`delete`] implements
//! the recursive folder removal. [`memory`] provides in-memory backends for
//! tests and local experimentation.

pub mod backend;
pub mod bucket;
pub mod delete;
pub mod memory;
pub mod merge;
pub mod path;
pub mod repo;

use serde::Serialize;

pub use backend::{EntryKind, FileContent, FlatObject, FlatStore, PutOutcome, TreeEntry, TreeStore};
pub use bucket::BucketClient;
pub use delete::{delete_folder, delete_prefix, DeleteStats};
pub use merge::merge_listing;
pub use path::{join, normalize, normalize_folder, safe_filename, StorageKey};
pub use repo::RepoClient;

/// Well-known zero-byte placeholder filename that makes empty folders
/// representable in the commit-based backend.
pub const FOLDER_MARKER: &str = ".gitkeep";

/// Marker object key for a folder.
pub fn marker_key(folder: &str) -> String {
    path::join(folder, FOLDER_MARKER)
}

/// Which backend reported an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// The tree-structured Git contents backend.
    Repo,
    /// The flat-key-space object-storage backend.
    Bucket,
}

/// One row of a merged directory listing.
///
/// A projection of remote state, constructed fresh per request and never
/// persisted. File entries carry size, download URL and MIME type;
/// directory entries carry none of those.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// Display name (last path segment).
    pub name: String,
    /// Full storage-relative path.
    pub path: String,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Which backend this entry (or its winning metadata) came from.
    pub source: EntrySource,
    /// File size in bytes. `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Resolvable download URL. `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// MIME type guessed from the filename. `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Entry {
    /// Build a directory entry.
    pub fn dir(name: impl Into<String>, path: impl Into<String>, source: EntrySource) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir: true,
            source,
            size: None,
            download_url: None,
            mime_type: None,
        }
    }

    /// Build a file entry.
    pub fn file(
        name: impl Into<String>,
        path: impl Into<String>,
        source: EntrySource,
        size: Option<u64>,
        download_url: Option<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir: false,
            source,
            size,
            download_url,
            mime_type,
        }
    }
}
