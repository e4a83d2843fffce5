//! Common utilities for Twin server integration tests
//!
//! Builds the full router over in-memory adapters so every test gets an
//! isolated blob store, metadata store and user table with no external
//! services.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestApp, alice};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let app = TestApp::new();
//!     let (status, body) = app.get_json("/api/v1/assets", alice()).await;
//! }
//! ```

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;

use twin_server::{
    api::{self, AppState},
    auth::{AuthPolicy, CallerResolver, GatewayHeaderProvider, USER_ID_HEADER, USER_ROLES_HEADER},
    config::{Config, UploadConfig},
    db::{MemoryMetadataStore, MemoryUserStore},
    features::assets::AssetServices,
    jobs::{JobQueue, LocalJobQueue, WorkerContext},
    models::{AssetRecord, NewAssetRecord, UploadStatus},
    storage::MemoryBlobStore,
};

pub const BLOB_BASE_URL: &str = "http://blobs.test";
const BOUNDARY: &str = "twin-test-boundary";

// ============================================================================
// Callers
// ============================================================================

/// Request identity: `None` is anonymous.
#[derive(Debug, Clone, Copy)]
pub struct As(pub Option<(&'static str, &'static str)>);

pub fn anonymous() -> As {
    As(None)
}

pub fn alice() -> As {
    As(Some(("alice", "")))
}

pub fn bob() -> As {
    As(Some(("bob", "")))
}

pub fn admin() -> As {
    As(Some(("root", "admin")))
}

// ============================================================================
// Test application
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub blobs: Arc<MemoryBlobStore>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub users: Arc<MemoryUserStore>,
    pub temp_dir: TempDir,
    pub worker: Option<JoinHandle<()>>,
}

impl TestApp {
    /// No job queue: every upload runs inline.
    pub fn new() -> Self {
        Self::build(|_| None, None)
    }

    /// In-process queue with a low async threshold.
    pub fn with_local_queue(async_threshold_bytes: u64) -> Self {
        Self::build(
            |ctx| {
                let (queue, worker) = LocalJobQueue::start(ctx);
                Some((Arc::new(queue) as Arc<dyn JobQueue>, Some(worker)))
            },
            Some(async_threshold_bytes),
        )
    }

    /// Caller-supplied queue with a low async threshold.
    pub fn with_queue(queue: Arc<dyn JobQueue>, async_threshold_bytes: u64) -> Self {
        Self::build(move |_| Some((queue, None)), Some(async_threshold_bytes))
    }

    fn build<F>(make_queue: F, async_threshold_bytes: Option<u64>) -> Self
    where
        F: FnOnce(WorkerContext) -> Option<(Arc<dyn JobQueue>, Option<JoinHandle<()>>)>,
    {
        let blobs = Arc::new(MemoryBlobStore::new(BLOB_BASE_URL));
        let metadata = Arc::new(MemoryMetadataStore::new());
        let users = Arc::new(MemoryUserStore::new());
        let temp_dir = tempfile::tempdir().unwrap();

        let (queue, worker) = match make_queue(WorkerContext {
            blobs: blobs.clone(),
            metadata: metadata.clone(),
        }) {
            Some((queue, worker)) => (Some(queue), worker),
            None => (None, None),
        };

        let mut uploads = UploadConfig {
            temp_dir: temp_dir.path().join("uploads"),
            extract_batch_size: 2,
            ..UploadConfig::default()
        };
        if let Some(threshold) = async_threshold_bytes {
            uploads.async_threshold_bytes = threshold;
        }

        let services = AssetServices {
            blobs: blobs.clone(),
            metadata: metadata.clone(),
            queue,
            callers: CallerResolver::new(
                AuthPolicy::Enforced {
                    admin_role: "admin".to_string(),
                },
                Arc::new(GatewayHeaderProvider),
                users.clone(),
            ),
            uploads,
        };

        let config = Config::default();
        let router = api::create_router(AppState::default(), services, &config);

        Self {
            router,
            blobs,
            metadata,
            users,
            temp_dir,
            worker,
        }
    }

    pub fn upload_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("uploads")
    }

    /// Number of files left in the upload spool directory.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    pub async fn get_json(&self, uri: &str, caller: As) -> (StatusCode, Value) {
        self.send_json(request("GET", uri, caller).body(Body::empty()).unwrap()).await
    }

    pub async fn delete_json(&self, uri: &str, caller: As) -> (StatusCode, Value) {
        self.send_json(request("DELETE", uri, caller).body(Body::empty()).unwrap()).await
    }

    pub async fn json(&self, method: &str, uri: &str, caller: As, body: Value) -> (StatusCode, Value) {
        self.send_json(
            request(method, uri, caller)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(&self, uri: &str, caller: As, form: &Multipart) -> (StatusCode, Value) {
        self.send_json(
            request("POST", uri, caller)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(form.encode()))
                .unwrap(),
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Direct store access
    // ------------------------------------------------------------------------

    pub async fn insert(&self, record: NewAssetRecord) -> AssetRecord {
        use twin_server::db::MetadataStore;
        self.metadata.save(record).await.unwrap()
    }

    /// Wait until the record leaves `pending`/`processing`.
    pub async fn wait_for_terminal(&self, id: i64) -> AssetRecord {
        for _ in 0..500 {
            if let Some(record) = self.metadata.find(id).await {
                if record.upload_status.map_or(true, |s| s.is_terminal()) {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("upload {} did not finish", id);
    }

    /// Wait until the worker has removed every spooled archive.
    pub async fn wait_for_spool_drain(&self) {
        for _ in 0..500 {
            if self.spooled_files() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("spooled uploads were not removed");
    }
}

pub fn request(method: &str, uri: &str, caller: As) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let As(Some((subject, roles))) = caller {
        builder = builder.header(USER_ID_HEADER, subject);
        if !roles.is_empty() {
            builder = builder.header(USER_ROLES_HEADER, roles);
        }
    }
    builder
}

// ============================================================================
// Fixtures
// ============================================================================

/// multipart/form-data body builder
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    fields: Vec<(String, String)>,
    file: Option<(String, String, Vec<u8>)>,
}

impl Multipart {
    /// Upload with the required text fields filled in.
    pub fn asset(filename: &str, content_type: &str, data: &[u8]) -> Self {
        Self::default()
            .field("description", "Harbour crane")
            .field("source", "https://example.com/harbour")
            .file(filename, content_type, data)
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn file(mut self, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.file = Some((filename.to_string(), content_type.to_string(), data.to_vec()));
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in &self.fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, content_type, data)) = &self.file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, filename, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}

/// In-memory ZIP archive with the given entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn tileset_zip() -> Vec<u8> {
    zip_bytes(&[
        ("city/tileset.json", br#"{"asset":{"version":"1.0"}}"#),
        ("city/0/0.b3dm", b"tile-0"),
        ("city/0/1.b3dm", b"tile-1"),
    ])
}

pub fn record(name: &str, owner_id: Option<i64>, is_public: bool) -> NewAssetRecord {
    NewAssetRecord {
        name: name.to_string(),
        content_type: "application/octet-stream".to_string(),
        filename: "seeded.bin".to_string(),
        description: "Seeded".to_string(),
        source: "https://example.com/seed".to_string(),
        owner_id,
        is_public,
        url: format!("{}/seeded.bin", name),
        tileset_url: None,
        upload_status: Some(UploadStatus::Completed),
        upload_job_id: None,
        upload_error: None,
        file_count: None,
        date: chrono::Utc::now(),
    }
}
