//! ZIP archive extraction into blob storage
//!
//! Extraction is all-or-nothing: the root file is located before the first
//! write, entries are written in sequential batches of bounded concurrency,
//! and any failure deletes everything written so far before the error is
//! returned. Entry names are resolved against the archive root, so no entry
//! can land outside the base path.

use futures::future::join_all;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{debug, info, warn};
use twin_common::best_effort;
use zip::ZipArchive;

use crate::error::AppError;
use crate::storage::{normalize_key, BlobStore, StorageError};

/// Name of the tileset root document.
pub const ROOT_FILE_NAME: &str = "tileset.json";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Invalid ZIP archive: no tileset.json found")]
    NoRootFile,

    #[error("Invalid ZIP archive: entry '{0}' resolves outside the archive root")]
    UnsafeEntry(String),

    #[error("Failed to read archive entry '{path}': {reason}")]
    EntryRead { path: String, reason: String },

    #[error("Failed to store archive entry '{path}': {source}")]
    Store {
        path: String,
        #[source]
        source: StorageError,
    },
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Store {
                source: StorageError::Backend(_),
                ..
            } => AppError::Internal(err.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Root file path relative to the base path.
    pub root_file: String,
    pub file_count: usize,
    pub stored_paths: Vec<String>,
}

pub struct ArchiveExtractor<'a> {
    blobs: &'a dyn BlobStore,
    batch_size: usize,
}

struct Entry {
    index: usize,
    path: String,
}

impl<'a> ArchiveExtractor<'a> {
    pub fn new(blobs: &'a dyn BlobStore, batch_size: usize) -> Self {
        Self {
            blobs,
            batch_size: batch_size.max(1),
        }
    }

    #[tracing::instrument(skip(self, archive), fields(bytes = archive.len()))]
    pub async fn extract(
        &self,
        archive: Vec<u8>,
        base_path: &str,
    ) -> Result<ExtractionOutcome, ExtractError> {
        let mut zip = ZipArchive::new(Cursor::new(archive))
            .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;

        let mut entries = Vec::new();
        for index in 0..zip.len() {
            let file = zip
                .by_index_raw(index)
                .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;
            if file.is_dir() {
                continue;
            }
            let path = normalize_key(file.name())
                .map_err(|_| ExtractError::UnsafeEntry(file.name().to_string()))?;
            entries.push(Entry { index, path });
        }

        let raw_paths: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
        for (entry, path) in entries.iter_mut().zip(strip_common_root(&raw_paths)) {
            entry.path = path;
        }

        let relative_paths: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
        let root_file = detect_root_file(&relative_paths).ok_or(ExtractError::NoRootFile)?;

        debug!(
            entries = entries.len(),
            root_file = %root_file,
            base_path,
            "Archive scanned"
        );

        let mut stored_paths = Vec::with_capacity(entries.len());

        for batch in entries.chunks(self.batch_size) {
            let mut pending = Vec::with_capacity(batch.len());
            for entry in batch {
                match read_entry(&mut zip, entry) {
                    Ok(data) => pending.push((format!("{}/{}", base_path, entry.path), data)),
                    Err(e) => {
                        self.rollback(&stored_paths).await;
                        return Err(e);
                    },
                }
            }

            let writes = pending
                .into_iter()
                .map(|(path, data)| async move {
                    let result = self.blobs.save_with_path(data, &path).await;
                    (path, result)
                });

            let mut failure = None;
            for (path, result) in join_all(writes).await {
                match result {
                    Ok(key) => stored_paths.push(key),
                    Err(source) => {
                        if failure.is_none() {
                            failure = Some(ExtractError::Store { path, source });
                        }
                    },
                }
            }

            if let Some(e) = failure {
                self.rollback(&stored_paths).await;
                return Err(e);
            }
        }

        info!(
            file_count = stored_paths.len(),
            base_path,
            "Archive extracted"
        );

        Ok(ExtractionOutcome {
            root_file,
            file_count: stored_paths.len(),
            stored_paths,
        })
    }

    async fn rollback(&self, stored: &[String]) {
        if stored.is_empty() {
            return;
        }
        warn!(count = stored.len(), "Rolling back partially extracted archive");
        best_effort("rollback archive extraction", self.blobs.delete_batch(stored)).await;
    }
}

fn read_entry(zip: &mut ZipArchive<Cursor<Vec<u8>>>, entry: &Entry) -> Result<Vec<u8>, ExtractError> {
    let read_error = |reason: String| ExtractError::EntryRead {
        path: entry.path.clone(),
        reason,
    };

    let mut file = zip.by_index(entry.index).map_err(|e| read_error(e.to_string()))?;
    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut data).map_err(|e| read_error(e.to_string()))?;
    Ok(data)
}

/// Drop a first path segment shared by every entry.
pub fn strip_common_root(paths: &[String]) -> Vec<String> {
    let first_segment = |p: &str| p.split_once('/').map(|(head, _)| head.to_string());

    let common = match paths.first().and_then(|p| first_segment(p)) {
        Some(candidate)
            if paths
                .iter()
                .all(|p| first_segment(p).as_deref() == Some(candidate.as_str())) =>
        {
            Some(candidate)
        },
        _ => None,
    };

    match common {
        Some(root) => paths
            .iter()
            .map(|p| p[root.len() + 1..].to_string())
            .collect(),
        None => paths.to_vec(),
    }
}

/// Root document by priority: top level, one directory deep, anywhere.
pub fn detect_root_file(paths: &[String]) -> Option<String> {
    if let Some(top) = paths.iter().find(|p| p.as_str() == ROOT_FILE_NAME) {
        return Some(top.clone());
    }

    let nested = format!("/{}", ROOT_FILE_NAME);
    let depth = |p: &str| p.matches('/').count();

    if let Some(one_deep) = paths
        .iter()
        .filter(|p| depth(p) == 1 && p.ends_with(&nested))
        .min()
    {
        return Some(one_deep.clone());
    }

    paths
        .iter()
        .filter(|p| p.ends_with(ROOT_FILE_NAME))
        .min_by(|a, b| depth(a).cmp(&depth(b)).then(a.cmp(b)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn strings(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_strip_common_root() {
        assert_eq!(
            strip_common_root(&strings(&["city/tileset.json", "city/tiles/0.b3dm"])),
            strings(&["tileset.json", "tiles/0.b3dm"])
        );
        assert_eq!(
            strip_common_root(&strings(&["a/tileset.json", "b/0.b3dm"])),
            strings(&["a/tileset.json", "b/0.b3dm"])
        );
        assert_eq!(
            strip_common_root(&strings(&["tileset.json", "city/0.b3dm"])),
            strings(&["tileset.json", "city/0.b3dm"])
        );
    }

    #[test]
    fn test_detect_root_priority() {
        assert_eq!(
            detect_root_file(&strings(&["a/b/tileset.json", "x/tileset.json", "tileset.json"])),
            Some("tileset.json".to_string())
        );
        assert_eq!(
            detect_root_file(&strings(&["a/b/tileset.json", "x/tileset.json"])),
            Some("x/tileset.json".to_string())
        );
        assert_eq!(
            detect_root_file(&strings(&["deep/er/path/tileset.json", "model.b3dm"])),
            Some("deep/er/path/tileset.json".to_string())
        );
        assert_eq!(detect_root_file(&strings(&["model.b3dm"])), None);
        assert_eq!(detect_root_file(&[]), None);
    }

    #[tokio::test]
    async fn test_extracts_under_base_path() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        let archive = zip_of(&[
            ("city/tileset.json", b"{}"),
            ("city/tiles/0.b3dm", b"tile0"),
            ("city/tiles/1.b3dm", b"tile1"),
        ]);

        let outcome = ArchiveExtractor::new(&blobs, 2)
            .extract(archive, "tilesets/base")
            .await
            .unwrap();

        assert_eq!(outcome.root_file, "tileset.json");
        assert_eq!(outcome.file_count, 3);
        assert_eq!(
            blobs.keys().await,
            strings(&[
                "tilesets/base/tileset.json",
                "tilesets/base/tiles/0.b3dm",
                "tilesets/base/tiles/1.b3dm",
            ])
        );
    }

    #[tokio::test]
    async fn test_rootless_archive_writes_nothing() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        let archive = zip_of(&[("model.b3dm", b"tile")]);

        let err = ArchiveExtractor::new(&blobs, 10)
            .extract(archive, "tilesets/base")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::NoRootFile));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_earlier_batches() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        blobs.fail_writes_containing("broken").await;

        let archive = zip_of(&[
            ("tileset.json", b"{}"),
            ("a.b3dm", b"a"),
            ("b.b3dm", b"b"),
            ("c.b3dm", b"c"),
            ("broken.b3dm", b"x"),
        ]);

        let err = ArchiveExtractor::new(&blobs, 2)
            .extract(archive, "tilesets/base")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Store { .. }));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_traversal_entry_is_rejected_before_any_write() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        let archive = zip_of(&[
            ("tileset.json", b"{}"),
            ("../../../../escape.txt", b"x"),
        ]);

        let err = ArchiveExtractor::new(&blobs, 1)
            .extract(archive, "tilesets/base")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::UnsafeEntry(_)));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_single_parent_entry_cannot_reach_sibling_tileset() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        blobs
            .save_with_path(b"original".to_vec(), "tilesets/victim/tileset.json")
            .await
            .unwrap();

        let archive = zip_of(&[
            ("tileset.json", b"{}"),
            ("../victim/tileset.json", b"overwritten"),
        ]);

        let err = ArchiveExtractor::new(&blobs, 10)
            .extract(archive, "tilesets/base")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::UnsafeEntry(ref name) if name == "../victim/tileset.json"));
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
        assert_eq!(blobs.keys().await, strings(&["tilesets/victim/tileset.json"]));
        assert_eq!(
            blobs.retrieve("tilesets/victim/tileset.json").await.unwrap(),
            b"original".to_vec()
        );
    }

    #[tokio::test]
    async fn test_dotdot_inside_root_is_allowed() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        let archive = zip_of(&[("tileset.json", b"{}"), ("tiles/../data.bin", b"d")]);

        let outcome = ArchiveExtractor::new(&blobs, 10)
            .extract(archive, "tilesets/base")
            .await
            .unwrap();

        assert_eq!(outcome.file_count, 2);
        assert!(blobs.keys().await.contains(&"tilesets/base/data.bin".to_string()));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_archive() {
        let blobs = MemoryBlobStore::new("http://blobs.local");
        let err = ArchiveExtractor::new(&blobs, 10)
            .extract(b"definitely not a zip".to_vec(), "tilesets/base")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::InvalidArchive(_)));
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
    }
}
