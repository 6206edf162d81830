//! Path normalization for storage keys.
//!
//! User input (folder names from the URL, filenames from uploads) is turned
//! into normalized, slash-separated keys that are safe to hand to either
//! backend: no leading or trailing slash, no `..` segments, no empty
//! segments, filename characters restricted to a safe set.

use std::fmt;

use crate::{Result, ShelfError};

/// A normalized, provider-relative path.
///
/// Two keys are equal iff their normalized string forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Validate an already-normalized key, as received on read/delete routes.
    ///
    /// Unlike [`normalize`], this does not rewrite characters: the key must
    /// refer to an object that already exists under its exact name. It only
    /// rejects keys that could escape the storage root or smuggle header
    /// bytes: `..` segments, leading/trailing/doubled slashes, and control
    /// characters.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ShelfError::InvalidPath("empty path".to_string()));
        }
        if raw.starts_with('/') || raw.ends_with('/') {
            return Err(ShelfError::InvalidPath(format!(
                "path must not start or end with a slash: {raw}"
            )));
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(ShelfError::InvalidPath(
                "path contains control characters".to_string(),
            ));
        }
        for segment in raw.split('/') {
            if segment.is_empty() {
                return Err(ShelfError::InvalidPath(format!(
                    "path contains an empty segment: {raw}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(ShelfError::InvalidPath(format!(
                    "path contains a traversal segment: {raw}"
                )));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reduce a user-supplied filename to a safe single path component.
///
/// Keeps alphanumerics, `-`, `_`, `.` and spaces; everything else is
/// dropped. Whitespace runs collapse to a single space, and leading dots
/// are stripped so the result can never be a traversal segment or a hidden
/// marker-style name.
pub fn safe_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;

    for c in name.chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
            out.push(c);
            last_was_space = false;
        } else if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        }
        // path separators, control bytes and other punctuation are dropped
    }

    let trimmed = out.trim().trim_start_matches('.').trim();
    trimmed.to_string()
}

/// Normalize a folder path: trim surrounding slashes and whitespace, filter
/// each segment through [`safe_filename`], and reject traversal.
///
/// Returns the empty string for a blank folder (the storage root).
pub fn normalize_folder(folder: &str) -> Result<String> {
    let folder = folder.trim().trim_matches('/');
    if folder.is_empty() {
        return Ok(String::new());
    }

    let mut segments = Vec::new();
    for raw in folder.split('/') {
        if raw.trim().is_empty() {
            continue;
        }
        if raw == ".." {
            return Err(ShelfError::InvalidPath(format!(
                "folder contains a traversal segment: {folder}"
            )));
        }
        let segment = safe_filename(raw);
        if segment.is_empty() {
            return Err(ShelfError::InvalidPath(format!(
                "folder segment reduces to nothing: {raw}"
            )));
        }
        segments.push(segment);
    }

    Ok(segments.join("/"))
}

/// Canonicalize a `(filename, folder)` pair into a storage key.
///
/// Fails with `InvalidPath` when the filename component is empty after
/// filtering.
pub fn normalize(filename: &str, folder: &str) -> Result<StorageKey> {
    let folder = normalize_folder(folder)?;
    let name = safe_filename(filename);
    if name.is_empty() {
        return Err(ShelfError::InvalidPath(format!(
            "filename reduces to nothing: {filename}"
        )));
    }

    let key = if folder.is_empty() {
        name
    } else {
        format!("{folder}/{name}")
    };
    Ok(StorageKey(key))
}

/// Join a normalized folder and a child name into a path string.
pub fn join(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_passthrough() {
        assert_eq!(safe_filename("report.pdf"), "report.pdf");
        assert_eq!(safe_filename("my_file-2.txt"), "my_file-2.txt");
    }

    #[test]
    fn test_safe_filename_strips_separators() {
        assert_eq!(safe_filename("a/b\\c.txt"), "abc.txt");
        assert_eq!(safe_filename("/etc/passwd"), "etcpasswd");
    }

    #[test]
    fn test_safe_filename_strips_leading_dots() {
        assert_eq!(safe_filename("..secret"), "secret");
        assert_eq!(safe_filename("...txt"), "txt");
        assert_eq!(safe_filename(".gitignore"), "gitignore");
    }

    #[test]
    fn test_safe_filename_collapses_whitespace() {
        assert_eq!(safe_filename("my   report\t2.pdf"), "my report 2.pdf");
        assert_eq!(safe_filename("  padded.txt  "), "padded.txt");
    }

    #[test]
    fn test_safe_filename_drops_null_and_control() {
        assert_eq!(safe_filename("a\x00b\r\nc.txt"), "ab c.txt");
    }

    #[test]
    fn test_safe_filename_unicode_kept() {
        assert_eq!(safe_filename("日本語.txt"), "日本語.txt");
    }

    #[test]
    fn test_normalize_plain() {
        let key = normalize("report.pdf", "docs").unwrap();
        assert_eq!(key.as_str(), "docs/report.pdf");
        assert_eq!(key.name(), "report.pdf");
    }

    #[test]
    fn test_normalize_empty_folder() {
        let key = normalize("report.pdf", "").unwrap();
        assert_eq!(key.as_str(), "report.pdf");
    }

    #[test]
    fn test_normalize_strips_folder_slashes() {
        let key = normalize("f.txt", "/docs/archive/").unwrap();
        assert_eq!(key.as_str(), "docs/archive/f.txt");
    }

    #[test]
    fn test_normalize_rejects_traversal_folder() {
        assert!(matches!(
            normalize("f.txt", "../escape"),
            Err(ShelfError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("f.txt", "docs/../../etc"),
            Err(ShelfError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_empty_filename() {
        assert!(matches!(
            normalize("", "docs"),
            Err(ShelfError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("///", "docs"),
            Err(ShelfError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize("..", "docs"),
            Err(ShelfError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_normalize_never_produces_traversal_or_leading_slash() {
        let inputs = [
            ("../../x.txt", "a/b"),
            ("..x.txt", "/a//b/"),
            ("weird\\..\\name.bin", "  c "),
            ("no rm a l.txt", ""),
        ];
        for (filename, folder) in inputs {
            if let Ok(key) = normalize(filename, folder) {
                assert!(!key.as_str().starts_with('/'), "leading slash: {key}");
                assert!(
                    !key.as_str().split('/').any(|s| s == ".."),
                    "traversal survived: {key}"
                );
            }
        }
    }

    #[test]
    fn test_normalize_folder_blank_is_root() {
        assert_eq!(normalize_folder("").unwrap(), "");
        assert_eq!(normalize_folder("  /  ").unwrap(), "");
    }

    #[test]
    fn test_normalize_folder_drops_empty_segments() {
        assert_eq!(normalize_folder("a//b").unwrap(), "a/b");
    }

    #[test]
    fn test_parse_accepts_existing_key() {
        let key = StorageKey::parse("docs/my report.pdf").unwrap();
        assert_eq!(key.as_str(), "docs/my report.pdf");
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert!(StorageKey::parse("docs/../secret").is_err());
        assert!(StorageKey::parse("./docs").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_slashes() {
        assert!(StorageKey::parse("/docs/f.txt").is_err());
        assert!(StorageKey::parse("docs/f.txt/").is_err());
        assert!(StorageKey::parse("docs//f.txt").is_err());
        assert!(StorageKey::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_control_chars() {
        assert!(StorageKey::parse("docs/f\r\n.txt").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a.txt"), "a.txt");
        assert_eq!(join("docs", "a.txt"), "docs/a.txt");
    }
}
