//! Background tileset uploads
//!
//! Large tileset archives are spooled to disk by the request handler, parked
//! as a `pending` row and handed to a [`JobQueue`]. A worker then runs the
//! archive extractor and moves the row to `completed` or `failed`.
//!
//! - **worker**: the job body, shared by every queue implementation
//! - **local**: in-process queue on a tokio channel
//! - **scheduler**: apalis queue persisted in PostgreSQL

pub mod local;
pub mod scheduler;
pub mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use local::LocalJobQueue;
pub use scheduler::ApalisJobQueue;
pub use worker::{process_tileset_upload, WorkerContext};

/// Tileset extraction job payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilesetUploadJob {
    /// Pending asset row this job completes
    pub record_id: i64,
    /// Collection the row belongs to
    pub asset_name: String,
    /// Spooled archive, owned by the job
    pub temp_path: PathBuf,
    /// Storage prefix the archive is extracted under
    pub base_path: String,
    pub filename: String,
    pub extract_batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: &str, job: TilesetUploadJob) -> anyhow::Result<JobHandle>;
}

/// Job id for the upload of asset `id`.
pub fn job_id_for(id: i64) -> String {
    format!("tileset-upload-{}", id)
}
