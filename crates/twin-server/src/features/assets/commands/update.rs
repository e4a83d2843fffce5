//! Update asset metadata
//!
//! Only `description`, `source` and `is_public` are client-editable. Status
//! fields belong to the upload pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{access, Caller, Operation};
use crate::error::{AppError, AppResult};
use crate::features::assets::{types::AssetView, AssetManager};
use crate::features::shared::validation::{
    coerce_bool, validate_length, validate_url, FieldError, MAX_TEXT_LENGTH,
};
use crate::models::AssetUpdate;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAssetCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Accepts booleans, numbers and strings like the upload form does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateAssetError {
    #[error("At least one of description, source or is_public must be provided")]
    Empty,

    #[error(transparent)]
    Field(#[from] FieldError),
}

impl From<UpdateAssetError> for AppError {
    fn from(err: UpdateAssetError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl UpdateAssetCommand {
    /// Validate and convert into a store update.
    pub fn validate(self) -> Result<AssetUpdate, UpdateAssetError> {
        if let Some(ref description) = self.description {
            if description.trim().is_empty() {
                return Err(FieldError::Required {
                    field: "description",
                }
                .into());
            }
            validate_length(description, "description", MAX_TEXT_LENGTH)?;
        }

        if let Some(ref source) = self.source {
            validate_url(source, "source")?;
        }

        let update = AssetUpdate {
            description: self.description,
            source: self.source,
            is_public: self.is_public.as_ref().filter(|v| !v.is_null()).map(coerce_bool),
            ..AssetUpdate::default()
        };

        if update.is_empty() {
            return Err(UpdateAssetError::Empty);
        }

        Ok(update)
    }
}

#[tracing::instrument(skip(manager, caller, command), fields(manager = %manager.name()))]
pub async fn handle(
    manager: &AssetManager,
    caller: &Caller,
    id: i64,
    command: UpdateAssetCommand,
) -> AppResult<AssetView> {
    let update = command.validate()?;

    let record = manager.fetch(id).await?;
    access::authorize(caller, &record, Operation::Write)?;

    let updated = manager.metadata().update_by_id(manager.name(), id, update).await?;

    tracing::info!(asset_id = id, "Asset metadata updated");
    Ok(manager.format(updated))
}
