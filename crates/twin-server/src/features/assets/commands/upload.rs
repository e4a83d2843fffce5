//! Single upload
//!
//! Simple assets and map layers become one blob plus one row. Tilesets are
//! either extracted inline or, when large and disk-backed with a queue
//! available, parked as a `pending` row and handed to the upload job.

use chrono::Utc;
use tracing::{info, warn};
use twin_common::best_effort;

use crate::error::{AppError, AppResult};
use crate::features::assets::{
    extractor::ArchiveExtractor,
    intake::{validate_content, UploadDescriptor, UploadPayload},
    routing::{choose_route, UploadRoute},
    types::{AssetView, QueuedUpload},
    AssetKind, AssetManager,
};
use crate::jobs::{job_id_for, TilesetUploadJob};
use crate::models::{AssetUpdate, NewAssetRecord, UploadStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Processed inline (HTTP 200)
    Stored(AssetView),
    /// Handed to the job queue (HTTP 202)
    Queued(QueuedUpload),
}

impl UploadOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UploadOutcome::Stored(view) => view.id,
            UploadOutcome::Queued(queued) => queued.id,
        }
    }
}

/// Metadata shared by every path, split off the payload.
struct UploadFields {
    description: String,
    source: String,
    filename: String,
    is_public: bool,
    content_type: String,
}

impl UploadFields {
    fn split(descriptor: UploadDescriptor) -> (Self, UploadPayload) {
        let UploadDescriptor {
            description,
            source,
            filename,
            is_public,
            content_type,
            payload,
        } = descriptor;

        (
            Self {
                description,
                source,
                filename,
                is_public,
                content_type,
            },
            payload,
        )
    }

    fn into_record(
        self,
        manager: &AssetManager,
        owner_id: Option<i64>,
        url: String,
        status: UploadStatus,
    ) -> NewAssetRecord {
        NewAssetRecord {
            name: manager.name().to_string(),
            content_type: self.content_type,
            filename: self.filename,
            description: self.description,
            source: self.source,
            owner_id,
            is_public: self.is_public,
            url,
            tileset_url: None,
            upload_status: Some(status),
            upload_job_id: None,
            upload_error: None,
            file_count: None,
            date: Utc::now(),
        }
    }
}

#[tracing::instrument(
    skip(manager, descriptor),
    fields(
        manager = %manager.name(),
        filename = %descriptor.filename,
        bytes = descriptor.payload.size()
    )
)]
pub async fn handle(
    manager: &AssetManager,
    owner_id: Option<i64>,
    descriptor: UploadDescriptor,
) -> AppResult<UploadOutcome> {
    match manager.kind() {
        AssetKind::Tileset => {
            let route = choose_route(
                descriptor.payload.size(),
                descriptor.payload.is_disk_backed(),
                manager.queue().is_some(),
                manager.services().uploads.async_threshold_bytes,
            );

            match route {
                UploadRoute::Sync => store_tileset(manager, owner_id, descriptor)
                    .await
                    .map(UploadOutcome::Stored),
                UploadRoute::Async => queue_tileset(manager, owner_id, descriptor)
                    .await
                    .map(UploadOutcome::Queued),
            }
        },
        AssetKind::SimpleAsset | AssetKind::MapLayer => store_blob(manager, owner_id, descriptor)
            .await
            .map(UploadOutcome::Stored),
    }
}

async fn store_blob(
    manager: &AssetManager,
    owner_id: Option<i64>,
    descriptor: UploadDescriptor,
) -> AppResult<AssetView> {
    let (fields, payload) = UploadFields::split(descriptor);

    let bytes = payload.into_bytes().await?;
    validate_content(manager.kind(), &bytes)?;

    let key = manager.blobs().save(bytes, manager.name(), &fields.filename).await?;
    let new_record = fields.into_record(manager, owner_id, key.clone(), UploadStatus::Completed);

    let record = match manager.metadata().save(new_record).await {
        Ok(record) => record,
        Err(e) => {
            best_effort("remove blob after failed metadata write", manager.blobs().delete(&key))
                .await;
            return Err(e.into());
        },
    };

    info!(asset_id = record.id, key = %key, "Asset stored");
    Ok(manager.format(record))
}

async fn store_tileset(
    manager: &AssetManager,
    owner_id: Option<i64>,
    descriptor: UploadDescriptor,
) -> AppResult<AssetView> {
    let (fields, payload) = UploadFields::split(descriptor);
    let base_path = manager.tileset_base_path();

    let bytes = payload.into_bytes().await?;
    let outcome = ArchiveExtractor::new(
        manager.blobs(),
        manager.services().uploads.extract_batch_size,
    )
    .extract(bytes, &base_path)
    .await?;

    let root_path = format!("{}/{}", base_path, outcome.root_file);
    let mut new_record =
        fields.into_record(manager, owner_id, base_path.clone(), UploadStatus::Completed);
    new_record.tileset_url = Some(manager.blobs().public_url(&root_path));
    new_record.file_count = Some(outcome.file_count as i64);

    let record = match manager.metadata().save(new_record).await {
        Ok(record) => record,
        Err(e) => {
            best_effort(
                "remove extracted tileset after failed metadata write",
                manager.blobs().delete_by_prefix(&base_path),
            )
            .await;
            return Err(e.into());
        },
    };

    info!(
        asset_id = record.id,
        base_path = %base_path,
        file_count = outcome.file_count,
        "Tileset extracted"
    );
    Ok(manager.format(record))
}

async fn queue_tileset(
    manager: &AssetManager,
    owner_id: Option<i64>,
    descriptor: UploadDescriptor,
) -> AppResult<QueuedUpload> {
    let queue = manager
        .queue()
        .cloned()
        .ok_or_else(|| AppError::Internal("Job queue is not configured".to_string()))?;

    let (fields, payload) = UploadFields::split(descriptor);
    let UploadPayload::TempFile { guard, .. } = payload else {
        return Err(AppError::Internal(
            "Queued uploads require a disk-backed payload".to_string(),
        ));
    };

    let filename = fields.filename.clone();
    let base_path = manager.tileset_base_path();
    let pending = manager
        .metadata()
        .save(fields.into_record(manager, owner_id, base_path.clone(), UploadStatus::Pending))
        .await?;

    let job_id = job_id_for(pending.id);
    let job = TilesetUploadJob {
        record_id: pending.id,
        asset_name: manager.name().to_string(),
        temp_path: guard.path().to_path_buf(),
        base_path,
        filename,
        extract_batch_size: manager.services().uploads.extract_batch_size,
    };

    let handle = match queue.enqueue(&job_id, job).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(asset_id = pending.id, error = %e, "Failed to enqueue tileset upload");
            best_effort(
                "remove pending record after enqueue failure",
                manager.metadata().delete(pending.id, manager.name()),
            )
            .await;
            guard.cleanup().await;
            return Err(AppError::Internal("Failed to queue upload for processing".to_string()));
        },
    };

    // The job owns the temp file from here on.
    guard.hand_off();

    let stamp = AssetUpdate {
        upload_job_id: Some(handle.id.clone()),
        ..AssetUpdate::default()
    };
    best_effort(
        "stamp pending record with job id",
        manager.metadata().update_by_id(manager.name(), pending.id, stamp),
    )
    .await;

    info!(asset_id = pending.id, job_id = %handle.id, "Tileset upload queued");

    Ok(QueuedUpload {
        id: pending.id,
        job_id: handle.id,
        status: UploadStatus::Pending,
        status_url: format!("{}/status", manager.resource_path(pending.id)),
    })
}
