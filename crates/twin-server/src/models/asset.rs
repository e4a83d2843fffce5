//! Asset record model
//!
//! One row per uploaded asset. `name` is the logical collection the asset
//! belongs to (one per configured asset manager); ids are unique across all
//! collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an archive upload.
///
/// Simple assets carry no status. Tilesets move through
/// `pending -> processing -> completed | failed`; a synchronous tileset upload
/// is created directly as `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// A background job may still be writing blobs for this record.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown upload status '{}'", other)),
        }
    }
}

/// Persisted asset metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    pub name: String,
    pub content_type: String,
    pub filename: String,
    pub description: String,
    pub source: String,
    pub owner_id: Option<i64>,
    pub is_public: bool,
    /// Blob key for simple assets, base prefix for tilesets.
    pub url: String,
    pub tileset_url: Option<String>,
    pub upload_status: Option<UploadStatus>,
    pub upload_job_id: Option<String>,
    pub upload_error: Option<String>,
    pub file_count: Option<i64>,
    pub date: DateTime<Utc>,
}

impl AssetRecord {
    /// Ownerless records predate ownership tracking and are writable by any
    /// authenticated caller.
    pub fn is_ownerless(&self) -> bool {
        self.owner_id.is_none()
    }

    pub fn is_upload_in_flight(&self) -> bool {
        self.upload_status.map(|s| s.is_in_flight()).unwrap_or(false)
    }
}

/// Fields for inserting a new record. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssetRecord {
    pub name: String,
    pub content_type: String,
    pub filename: String,
    pub description: String,
    pub source: String,
    pub owner_id: Option<i64>,
    pub is_public: bool,
    pub url: String,
    pub tileset_url: Option<String>,
    pub upload_status: Option<UploadStatus>,
    pub upload_job_id: Option<String>,
    pub upload_error: Option<String>,
    pub file_count: Option<i64>,
    pub date: DateTime<Utc>,
}

impl NewAssetRecord {
    pub fn into_record(self, id: i64) -> AssetRecord {
        AssetRecord {
            id,
            name: self.name,
            content_type: self.content_type,
            filename: self.filename,
            description: self.description,
            source: self.source,
            owner_id: self.owner_id,
            is_public: self.is_public,
            url: self.url,
            tileset_url: self.tileset_url,
            upload_status: self.upload_status,
            upload_job_id: self.upload_job_id,
            upload_error: self.upload_error,
            file_count: self.file_count,
            date: self.date,
        }
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetUpdate {
    pub description: Option<String>,
    pub source: Option<String>,
    pub is_public: Option<bool>,
    pub tileset_url: Option<String>,
    pub upload_status: Option<UploadStatus>,
    pub upload_job_id: Option<String>,
    pub upload_error: Option<String>,
    pub file_count: Option<i64>,
}

impl AssetUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn status(status: UploadStatus) -> Self {
        Self {
            upload_status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, record: &mut AssetRecord) {
        if let Some(ref description) = self.description {
            record.description = description.clone();
        }
        if let Some(ref source) = self.source {
            record.source = source.clone();
        }
        if let Some(is_public) = self.is_public {
            record.is_public = is_public;
        }
        if let Some(ref tileset_url) = self.tileset_url {
            record.tileset_url = Some(tileset_url.clone());
        }
        if let Some(status) = self.upload_status {
            record.upload_status = Some(status);
        }
        if let Some(ref job_id) = self.upload_job_id {
            record.upload_job_id = Some(job_id.clone());
        }
        if let Some(ref error) = self.upload_error {
            record.upload_error = Some(error.clone());
        }
        if let Some(count) = self.file_count {
            record.file_count = Some(count);
        }
    }
}
