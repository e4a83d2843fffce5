//! Poll the processing state of a tileset upload

use crate::auth::{access, Caller, Operation};
use crate::error::{AppError, AppResult};
use crate::features::assets::{
    status::{poll_view, UploadStatusView},
    AssetManager,
};

#[tracing::instrument(skip(manager, caller), fields(manager = %manager.name()))]
pub async fn handle(
    manager: &AssetManager,
    caller: &Caller,
    id: i64,
) -> AppResult<UploadStatusView> {
    if !manager.kind().has_status_endpoint() {
        return Err(AppError::NotFound("Asset not found".to_string()));
    }

    let record = manager.fetch(id).await?;
    access::authorize(caller, &record, Operation::Read)?;

    Ok(poll_view(&record))
}
