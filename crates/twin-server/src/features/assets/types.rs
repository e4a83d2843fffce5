//! Response types shared by the asset commands and queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AssetRecord, UploadStatus};

/// Formatted asset record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetView {
    pub id: i64,
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub description: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    pub is_public: bool,
    /// Direct object URL (simple assets) or tileset root URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// API path of this asset.
    pub content_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tileset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_status: Option<UploadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<i64>,
    pub date: DateTime<Utc>,
}

impl AssetView {
    pub fn from_record(
        record: AssetRecord,
        public_url: Option<String>,
        content_url: String,
        status_url: Option<String>,
    ) -> Self {
        Self {
            id: record.id,
            name: record.name,
            filename: record.filename,
            content_type: record.content_type,
            description: record.description,
            source: record.source,
            owner_id: record.owner_id,
            is_public: record.is_public,
            public_url,
            content_url,
            tileset_url: record.tileset_url,
            status_url,
            upload_status: record.upload_status,
            upload_error: record.upload_error,
            file_count: record.file_count,
            date: record.date,
        }
    }
}

/// Body of a 202 response for a queued tileset upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedUpload {
    pub id: i64,
    pub job_id: String,
    pub status: UploadStatus,
    pub status_url: String,
}

/// Body of a single delete response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedAsset {
    pub id: i64,
    pub deleted: bool,
}
