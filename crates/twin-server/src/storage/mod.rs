//! Blob storage
//!
//! Assets are written through the [`BlobStore`] trait. Every key passes
//! through [`normalize_key`] before it reaches a backend, so `..` segments can
//! never escape the storage root.

use async_trait::async_trait;
use thiserror::Error;

pub mod config;
pub mod memory;
pub mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3Storage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid path '{0}': resolves outside the storage root")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Object storage used by every asset kind.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `{folder}/{millis}-{filename}` and return the key.
    async fn save(&self, data: Vec<u8>, folder: &str, filename: &str) -> StorageResult<String>;

    /// Store `data` at an explicit key and return the normalized key.
    async fn save_with_path(&self, data: Vec<u8>, path: &str) -> StorageResult<String>;

    async fn retrieve(&self, path: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Delete every object under `prefix`, returning how many were removed.
    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<usize>;

    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()>;

    /// Public URL for a key. Pure string formatting, no I/O.
    fn public_url(&self, path: &str) -> String;
}

/// Resolve `.` and `..` segments and collapse empty segments.
///
/// A `..` that would climb above the root is rejected rather than clamped.
pub fn normalize_key(path: &str) -> StorageResult<String> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::PathTraversal(path.to_string()));
                }
            },
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(StorageError::InvalidPath(format!("'{}' is empty", path)));
    }

    Ok(segments.join("/"))
}

/// Normalized prefix with a trailing slash, so `tilesets/1` never matches
/// `tilesets/10/...`.
pub fn normalize_prefix(prefix: &str) -> StorageResult<String> {
    Ok(format!("{}/", normalize_key(prefix)?))
}

/// Key for [`BlobStore::save`]: `{folder}/{millis}-{basename}`.
pub fn timestamped_key(folder: &str, filename: &str) -> StorageResult<String> {
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| StorageError::InvalidPath(format!("'{}' has no file name", filename)))?;

    let millis = chrono::Utc::now().timestamp_millis();
    normalize_key(&format!("{}/{}-{}", folder, millis, basename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_key() {
        assert_eq!(normalize_key("tilesets/1/tileset.json").unwrap(), "tilesets/1/tileset.json");
        assert_eq!(normalize_key("/a//b/./c/").unwrap(), "a/b/c");
    }

    #[test]
    fn test_normalize_resolves_parent_segments() {
        assert_eq!(normalize_key("a/b/../c").unwrap(), "a/c");
        assert_eq!(normalize_key("a\\b\\c.b3dm").unwrap(), "a/b/c.b3dm");
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(matches!(normalize_key("../etc/passwd"), Err(StorageError::PathTraversal(_))));
        assert!(matches!(
            normalize_key("tilesets/1/../../../x"),
            Err(StorageError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(normalize_key("./"), Err(StorageError::InvalidPath(_))));
    }

    #[test]
    fn test_prefix_has_trailing_slash() {
        assert_eq!(normalize_prefix("tilesets/1").unwrap(), "tilesets/1/");
    }

    #[test]
    fn test_timestamped_key_uses_basename() {
        let key = timestamped_key("assets", "../../photo.png").unwrap();
        assert!(key.starts_with("assets/"));
        assert!(key.ends_with("-photo.png"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn test_timestamped_key_rejects_missing_name() {
        assert!(timestamped_key("assets", "dir/").is_err());
    }
}
