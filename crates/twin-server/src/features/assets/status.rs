//! Upload state machine and the polling view

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::models::{AssetRecord, UploadStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid upload status transition from {from} to {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: UploadStatus,
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

/// Validate a transition. Records without a status cannot enter the machine.
pub fn transition(
    current: Option<UploadStatus>,
    next: UploadStatus,
) -> Result<UploadStatus, TransitionError> {
    match current {
        Some(status) if status.can_transition_to(next) => Ok(next),
        Some(status) => Err(TransitionError {
            from: status.to_string(),
            to: next,
        }),
        None => Err(TransitionError {
            from: "none".to_string(),
            to: next,
        }),
    }
}

/// Body of `GET /{endpoint}/:id/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatusView {
    pub id: i64,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tileset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

pub fn poll_view(record: &AssetRecord) -> UploadStatusView {
    // Rows written before status tracking finished inline.
    let status = record.upload_status.unwrap_or(UploadStatus::Completed);

    let mut view = UploadStatusView {
        id: record.id,
        status,
        tileset_url: None,
        file_count: None,
        error: None,
        job_id: None,
    };

    match status {
        UploadStatus::Completed => {
            view.tileset_url = record.tileset_url.clone();
            view.file_count = record.file_count;
        },
        UploadStatus::Failed => {
            view.error = Some(
                record
                    .upload_error
                    .clone()
                    .unwrap_or_else(|| "Upload failed".to_string()),
            );
        },
        UploadStatus::Pending | UploadStatus::Processing => {
            view.job_id = record.upload_job_id.clone();
        },
    }

    view
}
