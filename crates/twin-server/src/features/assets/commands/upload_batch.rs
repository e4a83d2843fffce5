//! Batch upload from base64 JSON items
//!
//! Every item is validated before anything is written; one bad item rejects
//! the whole batch. After that, items are stored independently and a storage
//! failure only fails its own item.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::features::assets::{
    batch::{run_ordered, BatchItemResult, BatchOutcome},
    commands::upload,
    intake::{self, RawFile, RawUpload},
    AssetManager,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchUploadItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub is_public: Option<Value>,
    /// Base64 encoded file content
    #[serde(default)]
    pub file_data: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadBatchCommand {
    pub requests: Vec<BatchUploadItem>,
}

impl From<BatchUploadItem> for RawUpload {
    fn from(item: BatchUploadItem) -> Self {
        RawUpload {
            description: item.description,
            source: item.source,
            filename: item.filename,
            is_public: item.is_public,
            file: item.file_data.map(RawFile::Base64),
        }
    }
}

#[tracing::instrument(
    skip(manager, command),
    fields(manager = %manager.name(), items = command.requests.len())
)]
pub async fn handle(
    manager: &AssetManager,
    owner_id: i64,
    command: UploadBatchCommand,
) -> AppResult<BatchOutcome> {
    if command.requests.is_empty() {
        return Err(AppError::BadRequest("Batch must contain at least one item".to_string()));
    }

    let mut descriptors = Vec::with_capacity(command.requests.len());
    for (index, item) in command.requests.into_iter().enumerate() {
        let label = item
            .filename
            .clone()
            .unwrap_or_else(|| "unnamed".to_string());

        let descriptor = intake::validate(item.into(), manager.config()).map_err(|e| {
            AppError::BadRequest(format!("Item {} ({}): {}", index + 1, label, e))
        })?;
        descriptors.push(descriptor);
    }

    let outcome = run_ordered(
        descriptors,
        manager.services().uploads.batch_concurrency,
        |descriptor| async move {
            let filename = descriptor.filename.clone();
            match upload::handle(manager, Some(owner_id), descriptor).await {
                Ok(stored) => BatchItemResult::uploaded(filename, stored.id()),
                Err(e) => {
                    tracing::warn!(filename = %filename, error = %e, "Batch item failed");
                    BatchItemResult::upload_failed(filename, e.public_message())
                },
            }
        },
    )
    .await;

    tracing::info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Batch upload finished"
    );
    Ok(outcome)
}
