//! Tileset upload job body

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use twin_common::best_effort;

use super::TilesetUploadJob;
use crate::db::MetadataStore;
use crate::features::assets::{extractor::ArchiveExtractor, intake::TempFileGuard, status};
use crate::models::{AssetUpdate, UploadStatus};
use crate::storage::BlobStore;

/// Collaborators a worker needs, injected into every job run.
#[derive(Clone)]
pub struct WorkerContext {
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
}

/// Run one queued upload to a terminal status.
///
/// The spooled archive is removed whatever the outcome. Extraction failures
/// are recorded on the row and reported as `Ok(Failed)`; an `Err` means the
/// row itself could not be read or written.
#[tracing::instrument(skip(ctx, job), fields(asset_id = job.record_id, base_path = %job.base_path))]
pub async fn process_tileset_upload(
    ctx: &WorkerContext,
    job: TilesetUploadJob,
) -> Result<UploadStatus> {
    let guard = TempFileGuard::new(job.temp_path.clone());
    let result = run(ctx, &job).await;
    guard.cleanup().await;
    result
}

async fn run(ctx: &WorkerContext, job: &TilesetUploadJob) -> Result<UploadStatus> {
    let record = ctx
        .metadata
        .get_by_id(job.record_id, &job.asset_name)
        .await?
        .ok_or_else(|| anyhow!("Asset {} no longer exists", job.record_id))?;

    if let Some(current) = record.upload_status.filter(UploadStatus::is_terminal) {
        info!(status = %current, "Upload already finished, skipping");
        return Ok(current);
    }

    let next = status::transition(record.upload_status, UploadStatus::Processing)?;
    ctx.metadata
        .update_by_id(&job.asset_name, job.record_id, AssetUpdate::status(next))
        .await
        .context("Failed to mark upload as processing")?;

    let archive = match tokio::fs::read(&job.temp_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return mark_failed(ctx, job, format!("Failed to read uploaded archive: {}", e)).await
        },
    };

    let outcome = match ArchiveExtractor::new(ctx.blobs.as_ref(), job.extract_batch_size)
        .extract(archive, &job.base_path)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return mark_failed(ctx, job, e.to_string()).await,
    };

    let root_path = format!("{}/{}", job.base_path, outcome.root_file);
    let completed = AssetUpdate {
        tileset_url: Some(ctx.blobs.public_url(&root_path)),
        file_count: Some(outcome.file_count as i64),
        ..AssetUpdate::status(UploadStatus::Completed)
    };

    if let Err(e) = ctx
        .metadata
        .update_by_id(&job.asset_name, job.record_id, completed)
        .await
    {
        best_effort(
            "remove extracted tileset after failed completion write",
            ctx.blobs.delete_by_prefix(&job.base_path),
        )
        .await;
        return Err(e).context("Failed to mark upload as completed");
    }

    info!(file_count = outcome.file_count, filename = %job.filename, "Queued tileset extracted");
    Ok(UploadStatus::Completed)
}

async fn mark_failed(
    ctx: &WorkerContext,
    job: &TilesetUploadJob,
    message: String,
) -> Result<UploadStatus> {
    warn!(error = %message, "Queued tileset upload failed");

    let failed = AssetUpdate {
        upload_error: Some(message),
        ..AssetUpdate::status(UploadStatus::Failed)
    };
    ctx.metadata
        .update_by_id(&job.asset_name, job.record_id, failed)
        .await
        .context("Failed to mark upload as failed")?;

    Ok(UploadStatus::Failed)
}
