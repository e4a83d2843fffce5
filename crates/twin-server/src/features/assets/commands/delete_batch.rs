//! Batch delete by id
//!
//! No up-front validation: each id is looked up, checked and deleted on its
//! own, and a failure is reported in that item's result.

use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::{AppError, AppResult};
use crate::features::assets::{
    batch::{run_ordered, BatchItemResult, BatchOutcome},
    commands::delete,
    AssetManager,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteBatchCommand {
    pub ids: Vec<i64>,
}

#[tracing::instrument(
    skip(manager, caller, command),
    fields(manager = %manager.name(), items = command.ids.len())
)]
pub async fn handle(
    manager: &AssetManager,
    caller: &Caller,
    command: DeleteBatchCommand,
) -> AppResult<BatchOutcome> {
    if command.ids.is_empty() {
        return Err(AppError::BadRequest("Batch must contain at least one id".to_string()));
    }

    let outcome = run_ordered(
        command.ids,
        manager.services().uploads.batch_concurrency,
        |id| async move {
            match delete::handle(manager, caller, id).await {
                Ok(_) => BatchItemResult::deleted(id),
                Err(e) => BatchItemResult::delete_failed(id, e.public_message()),
            }
        },
    )
    .await;

    tracing::info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Batch delete finished"
    );
    Ok(outcome)
}
