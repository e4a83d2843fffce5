//! Delete a single asset
//!
//! Backing blobs go first and their failures are logged, not returned; the
//! row is removed last. Deletion is refused while an upload job may still be
//! writing under the record's prefix.

use twin_common::best_effort;

use crate::auth::{access, Caller, Operation};
use crate::error::{AppError, AppResult};
use crate::features::assets::{types::DeletedAsset, AssetKind, AssetManager};
use crate::models::AssetRecord;

#[tracing::instrument(skip(manager, caller), fields(manager = %manager.name()))]
pub async fn handle(manager: &AssetManager, caller: &Caller, id: i64) -> AppResult<DeletedAsset> {
    let record = manager.fetch(id).await?;
    access::authorize(caller, &record, Operation::Write)?;

    if let Some(status) = record.upload_status.filter(|s| s.is_in_flight()) {
        return Err(AppError::Conflict(format!(
            "Cannot delete asset while its upload is {}",
            status
        )));
    }

    remove_backing_blobs(manager, &record).await;

    if !manager.metadata().delete(id, manager.name()).await? {
        return Err(AppError::NotFound("Asset not found".to_string()));
    }

    tracing::info!(asset_id = id, "Asset deleted");
    Ok(DeletedAsset { id, deleted: true })
}

async fn remove_backing_blobs(manager: &AssetManager, record: &AssetRecord) {
    match manager.kind() {
        AssetKind::Tileset => {
            if let Some(count) = best_effort(
                "delete tileset blobs",
                manager.blobs().delete_by_prefix(&record.url),
            )
            .await
            {
                tracing::debug!(asset_id = record.id, count, "Tileset blobs removed");
            }
        },
        AssetKind::SimpleAsset | AssetKind::MapLayer => {
            best_effort("delete asset blob", manager.blobs().delete(&record.url)).await;
        },
    }
}
