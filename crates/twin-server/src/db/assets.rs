//! Asset metadata store
//!
//! Every lookup is scoped by the collection `name` as well as the id: asking
//! the `tilesets` manager for an id that belongs to `assets` yields `None`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{DbError, DbResult};
use crate::models::{AssetRecord, AssetUpdate, NewAssetRecord, UploadStatus};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, record: NewAssetRecord) -> DbResult<AssetRecord>;

    async fn get_by_id(&self, id: i64, name: &str) -> DbResult<Option<AssetRecord>>;

    /// Records of one collection, newest first. Bounds are inclusive.
    async fn get_by_date_range(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> DbResult<Vec<AssetRecord>>;

    /// Apply a partial update and return the stored result.
    async fn update_by_id(&self, name: &str, id: i64, update: AssetUpdate)
        -> DbResult<AssetRecord>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64, name: &str) -> DbResult<bool>;
}

const ASSET_COLUMNS: &str = "id, name, content_type, filename, description, source, owner_id, \
     is_public, url, tileset_url, upload_status, upload_job_id, upload_error, file_count, date";

#[derive(Debug, sqlx::FromRow)]
struct AssetRow {
    id: i64,
    name: String,
    content_type: String,
    filename: String,
    description: String,
    source: String,
    owner_id: Option<i64>,
    is_public: bool,
    url: String,
    tileset_url: Option<String>,
    upload_status: Option<String>,
    upload_job_id: Option<String>,
    upload_error: Option<String>,
    file_count: Option<i64>,
    date: DateTime<Utc>,
}

impl TryFrom<AssetRow> for AssetRecord {
    type Error = DbError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let upload_status = row
            .upload_status
            .as_deref()
            .map(str::parse::<UploadStatus>)
            .transpose()
            .map_err(DbError::InvalidData)?;

        Ok(AssetRecord {
            id: row.id,
            name: row.name,
            content_type: row.content_type,
            filename: row.filename,
            description: row.description,
            source: row.source,
            owner_id: row.owner_id,
            is_public: row.is_public,
            url: row.url,
            tileset_url: row.tileset_url,
            upload_status,
            upload_job_id: row.upload_job_id,
            upload_error: row.upload_error,
            file_count: row.file_count,
            date: row.date,
        })
    }
}

/// PostgreSQL implementation over the `assets` table
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[tracing::instrument(skip(self, record), fields(name = %record.name, filename = %record.filename))]
    async fn save(&self, record: NewAssetRecord) -> DbResult<AssetRecord> {
        let sql = format!(
            r#"
            INSERT INTO assets (name, content_type, filename, description, source, owner_id,
                                is_public, url, tileset_url, upload_status, upload_job_id,
                                upload_error, file_count, date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            ASSET_COLUMNS
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(&record.name)
            .bind(&record.content_type)
            .bind(&record.filename)
            .bind(&record.description)
            .bind(&record.source)
            .bind(record.owner_id)
            .bind(record.is_public)
            .bind(&record.url)
            .bind(&record.tileset_url)
            .bind(record.upload_status.map(|s| s.as_str()))
            .bind(&record.upload_job_id)
            .bind(&record.upload_error)
            .bind(record.file_count)
            .bind(record.date)
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(asset_id = row.id, "Asset record inserted");
        row.try_into()
    }

    async fn get_by_id(&self, id: i64, name: &str) -> DbResult<Option<AssetRecord>> {
        let sql = format!("SELECT {} FROM assets WHERE id = $1", ASSET_COLUMNS);

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) if row.name == name => Ok(Some(row.try_into()?)),
            Some(row) => {
                tracing::debug!(
                    asset_id = id,
                    requested = name,
                    actual = %row.name,
                    "Asset belongs to another collection"
                );
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn get_by_date_range(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> DbResult<Vec<AssetRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM assets
            WHERE name = $1
              AND ($2::timestamptz IS NULL OR date >= $2)
              AND ($3::timestamptz IS NULL OR date <= $3)
            ORDER BY date DESC, id DESC
            LIMIT $4
            "#,
            ASSET_COLUMNS
        );

        let rows = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(name)
            .bind(start)
            .bind(end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AssetRecord::try_from).collect()
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_by_id(
        &self,
        name: &str,
        id: i64,
        update: AssetUpdate,
    ) -> DbResult<AssetRecord> {
        let sql = format!(
            r#"
            UPDATE assets SET
                description   = COALESCE($3, description),
                source        = COALESCE($4, source),
                is_public     = COALESCE($5, is_public),
                tileset_url   = COALESCE($6, tileset_url),
                upload_status = COALESCE($7, upload_status),
                upload_job_id = COALESCE($8, upload_job_id),
                upload_error  = COALESCE($9, upload_error),
                file_count    = COALESCE($10, file_count)
            WHERE id = $1 AND name = $2
            RETURNING {}
            "#,
            ASSET_COLUMNS
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .bind(name)
            .bind(&update.description)
            .bind(&update.source)
            .bind(update.is_public)
            .bind(&update.tileset_url)
            .bind(update.upload_status.map(|s| s.as_str()))
            .bind(&update.upload_job_id)
            .bind(&update.upload_error)
            .bind(update.file_count)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Asset", &id.to_string()))?;

        row.try_into()
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: i64, name: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE id = $1 AND name = $2")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
