//! In-memory backends.
//!
//! Faithful stand-ins for the remote adapters, used by the test suites and
//! handy for poking at the web surface without network credentials. The tree
//! double records an operation log and supports per-key delete-failure
//! injection so walk ordering and best-effort policies can be asserted.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use crate::storage::backend::{
    EntryKind, FileContent, FlatObject, FlatStore, PutOutcome, TreeEntry, TreeStore,
};
use crate::storage::{join, FOLDER_MARKER};
use crate::{Result, ShelfError};

/// In-memory tree-structured backend.
///
/// Stores files as flat keys and synthesizes directory children from deeper
/// keys, the way a Git tree presents them.
#[derive(Debug, Default)]
pub struct MemoryTree {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_deletes: Mutex<HashSet<String>>,
    fail_lists: Mutex<HashSet<String>>,
    log: Mutex<Vec<String>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file without logging (test setup).
    pub fn seed(&self, key: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    /// Make every delete of `key` fail with a provider error.
    pub fn fail_delete(&self, key: &str) {
        self.fail_deletes.lock().unwrap().insert(key.to_string());
    }

    /// Make every list of `prefix` fail with a provider error.
    pub fn fail_list(&self, prefix: &str) {
        self.fail_lists.lock().unwrap().insert(prefix.to_string());
    }

    /// Whether a file exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    /// Drain the operation log.
    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut self.log.lock().unwrap())
    }

    fn record(&self, op: String) {
        self.log.lock().unwrap().push(op);
    }
}

#[async_trait::async_trait]
impl TreeStore for MemoryTree {
    async fn list(&self, prefix: &str) -> Result<Vec<TreeEntry>> {
        if self.fail_lists.lock().unwrap().contains(prefix) {
            return Err(ShelfError::Provider(format!(
                "injected failure listing {prefix}"
            )));
        }
        let files = self.files.lock().unwrap();

        // A file at the prefix lists as a single entry.
        if let Some(bytes) = files.get(prefix) {
            let name = prefix.rsplit('/').next().unwrap_or(prefix).to_string();
            return Ok(vec![TreeEntry {
                name,
                path: prefix.to_string(),
                kind: EntryKind::File,
                size: bytes.len() as u64,
            }]);
        }

        let mut dirs = BTreeSet::new();
        let mut out = Vec::new();
        let mut matched = false;

        for (key, bytes) in files.iter() {
            let remainder = if prefix.is_empty() {
                key.as_str()
            } else {
                match key.strip_prefix(&format!("{prefix}/")) {
                    Some(r) => r,
                    None => continue,
                }
            };
            matched = true;

            match remainder.split_once('/') {
                Some((dir, _)) => {
                    if dirs.insert(dir.to_string()) {
                        out.push(TreeEntry {
                            name: dir.to_string(),
                            path: join(prefix, dir),
                            kind: EntryKind::Dir,
                            size: 0,
                        });
                    }
                }
                None => {
                    if remainder != FOLDER_MARKER {
                        out.push(TreeEntry {
                            name: remainder.to_string(),
                            path: key.clone(),
                            kind: EntryKind::File,
                            size: bytes.len() as u64,
                        });
                    }
                }
            }
        }

        if !matched && !prefix.is_empty() {
            return Err(ShelfError::NotFound(prefix.to_string()));
        }
        Ok(out)
    }

    async fn read(&self, key: &str) -> Result<FileContent> {
        let files = self.files.lock().unwrap();
        let bytes = files
            .get(key)
            .cloned()
            .ok_or_else(|| ShelfError::NotFound(key.to_string()))?;
        Ok(FileContent {
            name: key.rsplit('/').next().unwrap_or(key).to_string(),
            bytes,
        })
    }

    async fn put(&self, key: &str, bytes: &[u8], _message: &str) -> Result<PutOutcome> {
        self.record(format!("put {key}"));
        let previous = self
            .files
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(if previous.is_some() {
            PutOutcome::Updated
        } else {
            PutOutcome::Created
        })
    }

    async fn delete(&self, key: &str, _message: &str) -> Result<()> {
        if self.fail_deletes.lock().unwrap().contains(key) {
            self.record(format!("delete {key} (failed)"));
            return Err(ShelfError::Provider(format!("injected failure for {key}")));
        }
        self.record(format!("delete {key}"));
        self.files
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ShelfError::NotFound(key.to_string()))
    }
}

/// In-memory flat-key-space backend.
#[derive(Debug, Default)]
pub struct MemoryFlat {
    objects: Mutex<BTreeMap<String, (Vec<u8>, Option<String>)>>,
    fail_lists: Mutex<HashSet<String>>,
}

impl MemoryFlat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object (test setup).
    pub fn seed(&self, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes.to_vec(), None));
    }

    /// Insert an object with an explicit content type (test setup).
    pub fn seed_with_type(&self, key: &str, bytes: &[u8], content_type: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (bytes.to_vec(), Some(content_type.to_string())),
        );
    }

    /// Make every list of `prefix` fail with a provider error.
    pub fn fail_list(&self, prefix: &str) {
        self.fail_lists.lock().unwrap().insert(prefix.to_string());
    }

    /// Whether an object exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl FlatStore for MemoryFlat {
    async fn list(&self, prefix: &str) -> Result<Vec<FlatObject>> {
        if self.fail_lists.lock().unwrap().contains(prefix) {
            return Err(ShelfError::Provider(format!(
                "injected failure listing {prefix}"
            )));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (bytes, content_type))| FlatObject {
                key: key.clone(),
                size: Some(bytes.len() as u64),
                content_type: content_type.clone(),
            })
            .collect())
    }

    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (bytes.to_vec(), Some(content_type.to_string())),
        );
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://bucket/{key}")
    }
}
