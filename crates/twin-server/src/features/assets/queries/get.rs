//! Fetch one asset
//!
//! Simple assets and map layers return their bytes; tilesets return the
//! formatted record (clients load the tileset from `tileset_url`).

use crate::auth::{access, Caller, Operation};
use crate::error::AppResult;
use crate::features::assets::{types::AssetView, AssetManager};

#[derive(Debug, Clone, PartialEq)]
pub enum AssetContent {
    Bytes {
        data: Vec<u8>,
        content_type: String,
        filename: String,
    },
    Record(AssetView),
}

#[tracing::instrument(skip(manager, caller), fields(manager = %manager.name()))]
pub async fn handle(manager: &AssetManager, caller: &Caller, id: i64) -> AppResult<AssetContent> {
    let record = manager.fetch(id).await?;
    access::authorize(caller, &record, Operation::Read)?;

    if !manager.kind().serves_content() {
        return Ok(AssetContent::Record(manager.format(record)));
    }

    let data = manager.blobs().retrieve(&record.url).await?;

    Ok(AssetContent::Bytes {
        data,
        content_type: record.content_type,
        filename: record.filename,
    })
}
