//! Recursive folder deletion.
//!
//! The commit-based backend has no bulk delete: removing a folder means
//! removing every file under it, one commit per file, then sweeping up the
//! folder markers. The walk uses an explicit worklist rather than language
//! recursion, so depth is bounded for pathological trees and every step is
//! loggable.
//!
//! The whole operation is at-least-once and non-atomic: a crash mid-walk
//! leaves a partially deleted subtree, and a failed child delete does not
//! stop siblings. Deleting a folder that does not exist is a no-op success.

use crate::storage::backend::{FlatStore, TreeStore};
use crate::storage::marker_key;
use crate::{Result, ShelfError};

/// What a folder deletion actually did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteStats {
    /// File objects removed (markers not included).
    pub files_deleted: usize,
    /// Folder markers removed.
    pub markers_deleted: usize,
    /// Individual operations that failed and were skipped.
    pub failures: usize,
}

impl DeleteStats {
    /// True when every attempted operation succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Collapse a delete result where a missing target is an acceptable outcome.
///
/// `Ok(true)` means the target was removed, `Ok(false)` means it was already
/// gone. Only `NotFound` is suppressed; other failures pass through.
pub fn allow_missing(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(ShelfError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete a folder subtree from the tree-structured backend.
///
/// Walks the subtree with a worklist, deleting file children as they are
/// discovered, then removes each visited folder's marker object
/// deepest-first — every leaf file is gone before the top-level marker.
pub async fn delete_folder(tree: &dyn TreeStore, folder: &str) -> DeleteStats {
    let mut stats = DeleteStats::default();
    let mut pending = vec![folder.to_string()];
    let mut visited: Vec<String> = Vec::new();

    while let Some(dir) = pending.pop() {
        let children = match tree.list(&dir).await {
            Ok(children) => children,
            // Absent subtree: nothing to do here.
            Err(ShelfError::NotFound(_)) => continue,
            Err(e) => {
                tracing::warn!(folder = %dir, error = %e, "failed to list folder during delete");
                stats.failures += 1;
                continue;
            }
        };
        visited.push(dir);

        for child in children {
            if child.is_dir() {
                pending.push(child.path);
                continue;
            }
            let message = format!("Delete {}", child.path);
            match allow_missing(tree.delete(&child.path, &message).await) {
                Ok(true) => stats.files_deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %child.path, error = %e, "failed to delete file, continuing");
                    stats.failures += 1;
                }
            }
        }
    }

    // Markers last, deepest folder first. Most folders never had one, so a
    // missing marker is the common case, not an error.
    for dir in visited.iter().rev() {
        let marker = marker_key(dir);
        let message = format!("Remove folder {dir}");
        match allow_missing(tree.delete(&marker, &message).await) {
            Ok(true) => stats.markers_deleted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(key = %marker, error = %e, "failed to delete folder marker");
                stats.failures += 1;
            }
        }
    }

    stats
}

/// Delete every bucket object under a folder prefix with one batched call.
pub async fn delete_prefix(flat: &dyn FlatStore, folder: &str) -> Result<usize> {
    let prefix = if folder.is_empty() {
        String::new()
    } else {
        format!("{folder}/")
    };

    let keys: Vec<String> = match flat.list(&prefix).await {
        Ok(objects) => objects.into_iter().map(|o| o.key).collect(),
        Err(ShelfError::NotFound(_)) => return Ok(0),
        Err(e) => return Err(e),
    };

    if keys.is_empty() {
        return Ok(0);
    }

    flat.remove(&keys).await?;
    Ok(keys.len())
}
