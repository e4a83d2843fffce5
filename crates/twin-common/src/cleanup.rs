//! Fire-and-log cleanup
//!
//! Every place where a failure is deliberately swallowed (rollback deletes,
//! temp file removal, blob cleanup before a row delete) goes through these
//! helpers so the silent-failure points can be found with one search.

use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use tracing::{debug, warn};

/// Await `operation`, log a warning if it fails, never propagate.
pub async fn best_effort<F, T, E>(what: &str, operation: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match operation.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation = what, error = %e, "Best-effort cleanup failed");
            None
        }
    }
}

/// Remove a file, treating "already gone" as success and logging anything else.
pub async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

/// Blocking variant for `Drop` implementations.
pub fn remove_file_quietly_blocking(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let failed: Option<()> = best_effort("delete", async { Err::<(), _>("boom") }).await;
        assert!(failed.is_none());

        let ok = best_effort("delete", async { Ok::<_, String>(3) }).await;
        assert_eq!(ok, Some(3));
    }

    #[tokio::test]
    async fn test_remove_file_quietly_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.tmp");
        tokio::fs::write(&path, b"data").await.unwrap();

        remove_file_quietly(&path).await;
        assert!(!path.exists());

        // second removal is a no-op
        remove_file_quietly(&path).await;
        remove_file_quietly_blocking(&path);
    }
}
