//! Asset managers
//!
//! One [`AssetManager`] per configured collection. All managers share the same
//! CRUD, access-control and batch behaviour; what differs per [`AssetKind`] is
//! how a payload is validated, stored and presented.
//!
//! # Layout
//!
//! - `intake` - raw request to [`intake::UploadDescriptor`]
//! - `extractor` - ZIP archive to blobs, all-or-nothing
//! - `routing` - sync vs. queued processing
//! - `status` - upload state machine and polling view
//! - `batch` - ordered, bounded batch execution
//! - `commands/`, `queries/`, `routes.rs` - the usual feature slice

pub mod batch;
pub mod commands;
pub mod extractor;
pub mod intake;
pub mod queries;
pub mod routes;
pub mod routing;
pub mod status;
pub mod types;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::auth::CallerResolver;
use crate::config::UploadConfig;
use crate::db::MetadataStore;
use crate::error::AppError;
use crate::jobs::JobQueue;
use crate::models::AssetRecord;
use crate::storage::BlobStore;

pub use intake::{IntakeError, UploadDescriptor, UploadPayload};
pub use routes::asset_routes;
pub use routing::{choose_route, UploadRoute, ASYNC_UPLOAD_THRESHOLD_BYTES};
pub use types::AssetView;

/// Prefix every manager is mounted under.
pub const API_PREFIX: &str = "/api/v1";

/// Behaviour family of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// One opaque blob, served back as bytes
    SimpleAsset,
    /// ZIP of a 3D Tiles tileset, extracted under a prefix
    Tileset,
    /// GeoJSON document, served back as bytes
    MapLayer,
}

impl AssetKind {
    pub fn default_content_type(&self) -> &'static str {
        match self {
            AssetKind::SimpleAsset => "application/octet-stream",
            AssetKind::Tileset => "application/zip",
            AssetKind::MapLayer => "application/geo+json",
        }
    }

    /// Whether GET returns the stored bytes or the formatted record.
    pub fn serves_content(&self) -> bool {
        !matches!(self, AssetKind::Tileset)
    }

    pub fn has_status_endpoint(&self) -> bool {
        matches!(self, AssetKind::Tileset)
    }
}

/// One configured collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetManagerConfig {
    /// Discriminator stored in `assets.name` and used as the blob folder.
    pub name: String,
    /// Path segment under [`API_PREFIX`].
    pub endpoint: String,
    pub kind: AssetKind,
    /// Required extension including the dot, compared case-insensitively.
    pub extension: Option<String>,
    /// Stored content type when the upload does not declare one.
    pub content_type: String,
    /// Declared MIME types accepted for the file part. Empty accepts anything.
    pub accepted_mime_types: Vec<String>,
}

impl AssetManagerConfig {
    pub fn simple(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind: AssetKind::SimpleAsset,
            extension: None,
            content_type: AssetKind::SimpleAsset.default_content_type().to_string(),
            accepted_mime_types: Vec::new(),
        }
    }

    pub fn tileset(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind: AssetKind::Tileset,
            extension: Some(".zip".to_string()),
            content_type: AssetKind::Tileset.default_content_type().to_string(),
            accepted_mime_types: vec![
                "application/zip".to_string(),
                "application/x-zip-compressed".to_string(),
                "application/x-zip".to_string(),
            ],
        }
    }

    pub fn map_layer(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind: AssetKind::MapLayer,
            extension: Some(".geojson".to_string()),
            content_type: AssetKind::MapLayer.default_content_type().to_string(),
            accepted_mime_types: vec![
                "application/geo+json".to_string(),
                "application/json".to_string(),
            ],
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::simple("assets", "assets"),
            Self::tileset("tilesets", "tilesets"),
            Self::map_layer("map_layers", "map-layers"),
        ]
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() || self.name.contains('/') {
            anyhow::bail!("Asset manager name '{}' is invalid", self.name);
        }

        let valid_endpoint = !self.endpoint.is_empty()
            && self
                .endpoint
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_endpoint {
            anyhow::bail!("Asset manager endpoint '{}' is invalid", self.endpoint);
        }

        if let Some(ref ext) = self.extension {
            if !ext.starts_with('.') || ext.len() < 2 {
                anyhow::bail!("Extension '{}' must start with a dot", ext);
            }
        }

        Ok(())
    }
}

/// Collaborators shared by every manager
#[derive(Clone)]
pub struct AssetServices {
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    /// `None` disables the async upload path.
    pub queue: Option<Arc<dyn JobQueue>>,
    pub callers: CallerResolver,
    pub uploads: UploadConfig,
}

/// Router state for one collection
#[derive(Clone)]
pub struct AssetManager {
    services: AssetServices,
    config: Arc<AssetManagerConfig>,
}

impl AssetManager {
    pub fn new(services: AssetServices, config: AssetManagerConfig) -> Self {
        Self {
            services,
            config: Arc::new(config),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> AssetKind {
        self.config.kind
    }

    pub fn config(&self) -> &AssetManagerConfig {
        &self.config
    }

    pub fn services(&self) -> &AssetServices {
        &self.services
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.services.blobs.as_ref()
    }

    pub fn metadata(&self) -> &dyn MetadataStore {
        self.services.metadata.as_ref()
    }

    pub fn callers(&self) -> &CallerResolver {
        &self.services.callers
    }

    pub fn queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.services.queue.as_ref()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.services.uploads.temp_dir
    }

    /// `/api/v1/{endpoint}/{id}`
    pub fn resource_path(&self, id: i64) -> String {
        format!("{}/{}/{}", API_PREFIX, self.config.endpoint, id)
    }

    /// Fresh storage prefix for an extracted tileset.
    pub fn tileset_base_path(&self) -> String {
        format!(
            "{}/{}-{}",
            self.config.name,
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4()
        )
    }

    /// Load a record of this collection or fail with NotFound.
    pub async fn fetch(&self, id: i64) -> Result<AssetRecord, AppError> {
        self.metadata()
            .get_by_id(id, self.name())
            .await?
            .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))
    }

    /// Presentation of a record for API responses.
    pub fn format(&self, record: AssetRecord) -> AssetView {
        let public_url = match self.kind() {
            AssetKind::Tileset => record.tileset_url.clone(),
            AssetKind::SimpleAsset | AssetKind::MapLayer => {
                Some(self.blobs().public_url(&record.url))
            },
        };
        let content_url = self.resource_path(record.id);
        let status_url = self
            .kind()
            .has_status_endpoint()
            .then(|| format!("{}/status", content_url));

        AssetView::from_record(record, public_url, content_url, status_url)
    }
}
