//! Asset API routes
//!
//! Every manager mounts the same router under its own endpoint:
//!
//! - `GET    /api/v1/{endpoint}` - List visible assets
//! - `POST   /api/v1/{endpoint}` - Upload (multipart)
//! - `POST   /api/v1/{endpoint}/batch` - Batch upload (base64 JSON)
//! - `DELETE /api/v1/{endpoint}/batch` - Batch delete
//! - `GET    /api/v1/{endpoint}/:id` - Fetch content or record
//! - `PUT    /api/v1/{endpoint}/:id` - Update metadata
//! - `DELETE /api/v1/{endpoint}/:id` - Delete
//! - `GET    /api/v1/{endpoint}/:id/status` - Upload status (tilesets only)
//!
//! # Examples
//!
//! ```rust,ignore
//! use twin_server::features::assets::{asset_routes, AssetManager};
//!
//! let app = Router::new()
//!     .nest("/tilesets", asset_routes(manager.kind()).with_state(manager));
//! ```

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::path::Path as FsPath;
use tokio::io::AsyncWriteExt;

use super::{
    commands::{self, DeleteBatchCommand, UpdateAssetCommand, UploadBatchCommand, UploadOutcome},
    intake::{self, RawFile, RawUpload, TempFileGuard},
    queries::{self, AssetContent, ListAssetsQuery},
    status::UploadStatusView,
    types::{AssetView, DeletedAsset},
    AssetKind, AssetManager,
};
use crate::auth::Caller;
use crate::error::{AppError, AppResult};
use crate::features::assets::batch::BatchOutcome;

// ============================================================================
// Router Configuration
// ============================================================================

pub fn asset_routes(kind: AssetKind) -> Router<AssetManager> {
    let router = Router::new()
        .route("/", get(list_assets).post(upload_asset))
        .route("/batch", post(upload_batch).delete(delete_batch))
        .route("/:id", get(get_asset).put(update_asset).delete(delete_asset));

    if kind.has_status_endpoint() {
        router.route("/:id/status", get(upload_status))
    } else {
        router
    }
}

fn bad_request(rejection: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(rejection.to_string())
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Upload a single asset
///
/// # Endpoint
///
/// `POST /api/v1/{endpoint}`
///
/// # Request Body (multipart/form-data)
///
/// - `file` - the payload (required)
/// - `description` - free text (required)
/// - `source` - provenance URL (required)
/// - `filename` - overrides the file part's name
/// - `is_public` - defaults to true
///
/// # Response
///
/// - `200 OK` - Stored inline
/// - `202 Accepted` - Tileset queued; poll `status_url`
/// - `400 Bad Request` - Validation or archive error
/// - `401 Unauthorized` - No identity
async fn upload_asset(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let user = manager.callers().require_user(&headers).await?;
    let multipart = multipart.map_err(bad_request)?;

    let raw = read_multipart(multipart, manager.temp_dir()).await?;
    let descriptor = intake::validate(raw, manager.config())?;

    let response = match commands::upload::handle(&manager, Some(user.id), descriptor).await? {
        UploadOutcome::Stored(view) => (StatusCode::OK, Json(view)).into_response(),
        UploadOutcome::Queued(queued) => (StatusCode::ACCEPTED, Json(queued)).into_response(),
    };

    Ok(response)
}

/// Update description, source or visibility
///
/// # Endpoint
///
/// `PUT /api/v1/{endpoint}/:id`
///
/// # Response
///
/// - `200 OK` - Updated record
/// - `400 Bad Request` - Empty or invalid update
/// - `401 Unauthorized` / `403 Forbidden` - Not the owner
/// - `404 Not Found`
async fn update_asset(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
    command: Result<Json<UpdateAssetCommand>, JsonRejection>,
) -> AppResult<Json<AssetView>> {
    let Path(id) = id.map_err(bad_request)?;
    let Json(command) = command.map_err(bad_request)?;
    let caller = manager.callers().resolve(&headers).await?;

    let view = commands::update::handle(&manager, &caller, id, command).await?;
    Ok(Json(view))
}

/// Delete an asset and its blobs
///
/// # Endpoint
///
/// `DELETE /api/v1/{endpoint}/:id`
///
/// # Response
///
/// - `200 OK`
/// - `401 Unauthorized` / `403 Forbidden`
/// - `404 Not Found`
/// - `409 Conflict` - Upload still pending or processing
async fn delete_asset(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<DeletedAsset>> {
    let Path(id) = id.map_err(bad_request)?;
    let caller = manager.callers().resolve(&headers).await?;

    let deleted = commands::delete::handle(&manager, &caller, id).await?;
    Ok(Json(deleted))
}

/// Upload several assets from base64 JSON
///
/// # Endpoint
///
/// `POST /api/v1/{endpoint}/batch`
///
/// # Request Body
///
/// ```json
/// {
///   "requests": [
///     { "description": "...", "source": "https://...", "filename": "a.zip",
///       "is_public": true, "file_data": "UEsDBBQ..." }
///   ]
/// }
/// ```
///
/// # Response
///
/// - `200 OK` - All items stored
/// - `207 Multi-Status` - Some items failed; see `results`
/// - `400 Bad Request` - Empty batch or any item invalid (nothing stored)
async fn upload_batch(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    command: Result<Json<UploadBatchCommand>, JsonRejection>,
) -> AppResult<BatchOutcome> {
    let user = manager.callers().require_user(&headers).await?;
    let Json(command) = command.map_err(bad_request)?;

    commands::upload_batch::handle(&manager, user.id, command).await
}

/// Delete several assets by id
///
/// # Endpoint
///
/// `DELETE /api/v1/{endpoint}/batch` with `{ "ids": [1, 2, 3] }`
async fn delete_batch(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    command: Result<Json<DeleteBatchCommand>, JsonRejection>,
) -> AppResult<BatchOutcome> {
    let user = manager.callers().require_user(&headers).await?;
    let Json(command) = command.map_err(bad_request)?;

    commands::delete_batch::handle(&manager, &Caller::User(user), command).await
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

async fn list_assets(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    query: Result<Query<ListAssetsQuery>, QueryRejection>,
) -> AppResult<Json<Vec<AssetView>>> {
    let Query(query) = query.map_err(bad_request)?;
    let caller = manager.callers().resolve_lenient(&headers).await;

    let assets = queries::list::handle(&manager, &caller, query).await?;
    Ok(Json(assets))
}

async fn get_asset(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Response> {
    let Path(id) = id.map_err(bad_request)?;
    let caller = manager.callers().resolve_lenient(&headers).await;

    let response = match queries::get::handle(&manager, &caller, id).await? {
        AssetContent::Bytes {
            data,
            content_type,
            filename,
        } => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_DISPOSITION, content_disposition(&filename)),
            ],
            data,
        )
            .into_response(),
        AssetContent::Record(view) => Json(view).into_response(),
    };

    Ok(response)
}

async fn upload_status(
    State(manager): State<AssetManager>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<UploadStatusView>> {
    let Path(id) = id.map_err(bad_request)?;
    let caller = manager.callers().resolve_lenient(&headers).await;

    let view = queries::status::handle(&manager, &caller, id).await?;
    Ok(Json(view))
}

// ============================================================================
// Multipart handling
// ============================================================================

fn multipart_error(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
}

async fn read_multipart(mut multipart: Multipart, temp_dir: &FsPath) -> AppResult<RawUpload> {
    let mut raw = RawUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => raw.file = Some(spool_to_disk(field, temp_dir).await?),
            "description" => raw.description = Some(field.text().await.map_err(multipart_error)?),
            "source" => raw.source = Some(field.text().await.map_err(multipart_error)?),
            "filename" => raw.filename = Some(field.text().await.map_err(multipart_error)?),
            "is_public" => {
                raw.is_public = Some(Value::String(field.text().await.map_err(multipart_error)?))
            },
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    Ok(raw)
}

/// Stream the file part to a temp file owned by a guard.
async fn spool_to_disk(mut field: Field<'_>, temp_dir: &FsPath) -> AppResult<RawFile> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);

    tokio::fs::create_dir_all(temp_dir).await?;
    let guard = TempFileGuard::new(temp_dir.join(format!("upload-{}.part", uuid::Uuid::new_v4())));

    let mut file = tokio::fs::File::create(guard.path()).await?;
    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    tracing::debug!(path = %guard.path().display(), size, "Upload spooled to disk");

    Ok(RawFile::Disk {
        guard,
        size,
        file_name,
        content_type,
    })
}

fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("inline; filename=\"{}\"", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_is_header_safe() {
        assert_eq!(content_disposition("a b.png"), "inline; filename=\"a b.png\"");
        assert_eq!(content_disposition("qu\"ote\n.png"), "inline; filename=\"qu_ote_.png\"");
        assert_eq!(content_disposition("café.png"), "inline; filename=\"caf_.png\"");
    }
}
