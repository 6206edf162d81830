//! Directory merger.
//!
//! Reconciles the two backend views of a folder into one deduplicated,
//! sorted listing. The tree backend reports real children; the bucket only
//! reports flat keys, so first-level subfolders are synthesized from key
//! prefixes. Entries land in an ordered map keyed by `(kind, name)`:
//! directories sort before files, names sort case-insensitively, and a
//! `(name, kind)` collision across backends resolves to whichever source
//! was inserted last — tree first, bucket second, so the bucket's metadata
//! wins. That precedence is a deliberate, fixed policy.

use std::collections::BTreeMap;

use crate::storage::backend::{FlatStore, TreeStore};
use crate::storage::{join, Entry, EntrySource};
use crate::ShelfError;

/// Ordered-map key: directories before files, then case-insensitive name.
///
/// The original-case name is the tiebreaker so two names differing only in
/// case remain distinct, deterministic entries rather than colliding.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ListKey {
    is_file: bool,
    lower: String,
    name: String,
}

impl ListKey {
    fn new(name: &str, is_dir: bool) -> Self {
        Self {
            is_file: !is_dir,
            lower: name.to_lowercase(),
            name: name.to_string(),
        }
    }
}

/// MIME type guessed from a filename extension.
fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name).first_or_octet_stream().to_string()
}

/// Proxy download URL for a tree-backend file, path segments percent-encoded.
fn proxy_url(path: &str) -> String {
    format!("/download/{}", urlencoding::encode(path).replace("%2F", "/"))
}

/// Merge both backends' views of `folder` into one sorted listing.
///
/// Browsing never fails: an absent prefix reads as empty, and an outage of
/// one backend is logged and skipped so the other backend's entries still
/// come back. Only both backends failing yields an empty listing.
pub async fn merge_listing(
    tree: &dyn TreeStore,
    flat: Option<&dyn FlatStore>,
    folder: &str,
) -> Vec<Entry> {
    let mut entries: BTreeMap<ListKey, Entry> = BTreeMap::new();

    // Tree backend first: real children, marker objects already filtered.
    match tree.list(folder).await {
        Ok(children) => {
            for child in children {
                let key = ListKey::new(&child.name, child.is_dir());
                let entry = if child.is_dir() {
                    Entry::dir(child.name.clone(), child.path.clone(), EntrySource::Repo)
                } else {
                    let mime = guess_mime(&child.name);
                    let url = proxy_url(&child.path);
                    Entry::file(
                        child.name.clone(),
                        child.path.clone(),
                        EntrySource::Repo,
                        Some(child.size),
                        Some(url),
                        Some(mime),
                    )
                };
                entries.insert(key, entry);
            }
        }
        Err(ShelfError::NotFound(_)) => {}
        Err(e) => {
            tracing::warn!(folder, error = %e, "tree backend unavailable for listing");
        }
    }

    // Bucket second, so its metadata wins on (name, kind) collisions.
    if let Some(flat) = flat {
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };

        match flat.list(&prefix).await {
            Ok(objects) => {
                for object in objects {
                    let remainder = match object.key.strip_prefix(&prefix) {
                        Some(r) if !r.is_empty() => r,
                        _ => continue,
                    };

                    match remainder.split_once('/') {
                        Some((dir, _)) => {
                            if dir.is_empty() {
                                continue;
                            }
                            // One synthetic entry per distinct first-level
                            // subfolder, however many keys lie beneath it.
                            entries.insert(
                                ListKey::new(dir, true),
                                Entry::dir(dir, join(folder, dir), EntrySource::Bucket),
                            );
                        }
                        None => {
                            let name = remainder;
                            let mime = object
                                .content_type
                                .clone()
                                .unwrap_or_else(|| guess_mime(name));
                            let url = flat.public_url(&object.key);
                            entries.insert(
                                ListKey::new(name, false),
                                Entry::file(
                                    name,
                                    object.key.clone(),
                                    EntrySource::Bucket,
                                    object.size,
                                    Some(url),
                                    Some(mime),
                                ),
                            );
                        }
                    }
                }
            }
            Err(ShelfError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(folder, error = %e, "bucket backend unavailable for listing");
            }
        }
    }

    entries.into_values().collect()
}
