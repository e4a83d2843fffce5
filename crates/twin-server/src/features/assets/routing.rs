//! Sync vs. queued processing of tileset uploads

/// Disk-backed uploads at or above this size go to the job queue (50 MiB).
pub const ASYNC_UPLOAD_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRoute {
    Sync,
    Async,
}

/// In-memory buffers always run inline: there is no file to hand to a job.
pub fn choose_route(
    size_bytes: u64,
    disk_backed: bool,
    queue_available: bool,
    threshold_bytes: u64,
) -> UploadRoute {
    if queue_available && disk_backed && size_bytes >= threshold_bytes {
        UploadRoute::Async
    } else {
        UploadRoute::Sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = ASYNC_UPLOAD_THRESHOLD_BYTES;

    #[test]
    fn test_large_disk_upload_with_queue_is_async() {
        assert_eq!(choose_route(T, true, true, T), UploadRoute::Async);
        assert_eq!(choose_route(T * 4, true, true, T), UploadRoute::Async);
    }

    #[test]
    fn test_everything_else_is_sync() {
        assert_eq!(choose_route(T - 1, true, true, T), UploadRoute::Sync);
        assert_eq!(choose_route(T * 4, false, true, T), UploadRoute::Sync);
        assert_eq!(choose_route(T * 4, true, false, T), UploadRoute::Sync);
    }
}
