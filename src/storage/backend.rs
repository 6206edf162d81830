//! Backend adapter traits.
//!
//! Each remote storage provider is hidden behind one of two narrow traits:
//! [`TreeStore`] for the commit-based contents API, where listings return
//! immediate children and every write is a commit, and [`FlatStore`] for the
//! object-storage bucket, where listings return flat keys and folders are a
//! client-side illusion.

use async_trait::async_trait;

use crate::Result;

/// Whether a tree child is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One immediate child of a tree-structured folder.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Child name (last path segment).
    pub name: String,
    /// Full storage-relative path.
    pub path: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes. Zero for directories.
    pub size: u64,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Content of a file read from a backend.
#[derive(Debug, Clone)]
pub struct FileContent {
    /// Filename (last path segment).
    pub name: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// Outcome of a put against the commit-based backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new object was committed.
    Created,
    /// An existing object was replaced using its revision token.
    Updated,
}

/// One object in a flat key listing.
#[derive(Debug, Clone)]
pub struct FlatObject {
    /// Full storage-relative key.
    pub key: String,
    /// Size in bytes, when the provider reports it.
    pub size: Option<u64>,
    /// Content type, when the provider reports it.
    pub content_type: Option<String>,
}

/// Tree-structured, commit-based storage backend.
///
/// Listings return immediate children with files and directories already
/// distinguished; the folder-marker object is filtered out. A `list` on an
/// absent prefix fails with `NotFound` — callers that want empty-on-missing
/// handle that themselves.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// List the immediate children of a folder.
    async fn list(&self, prefix: &str) -> Result<Vec<TreeEntry>>;

    /// Read a file's content.
    async fn read(&self, key: &str) -> Result<FileContent>;

    /// Create or update a file, committing with the given message.
    ///
    /// An update requires the current revision token of the existing object;
    /// the adapter probes for it and retries once on a stale-revision
    /// conflict before surfacing `Conflict`.
    async fn put(&self, key: &str, bytes: &[u8], message: &str) -> Result<PutOutcome>;

    /// Delete a file, committing with the given message.
    async fn delete(&self, key: &str, message: &str) -> Result<()>;
}

/// Flat-key-space object-storage backend.
///
/// `list` returns every key under the prefix — there are no directory
/// objects. `remove` is a single batched call.
#[async_trait]
pub trait FlatStore: Send + Sync {
    /// List all keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<FlatObject>>;

    /// Upload an object.
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// Remove a batch of keys in one call.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Publicly resolvable download URL for a key.
    ///
    /// Derived deterministically from the backend identity and the key, and
    /// stable as long as the object is not moved or deleted.
    fn public_url(&self, key: &str) -> String;
}
