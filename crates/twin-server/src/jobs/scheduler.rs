//! Job scheduler
//!
//! Durable upload queue on apalis with PostgreSQL storage.

use anyhow::{Context, Result};
use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{process_tileset_upload, JobHandle, JobQueue, TilesetUploadJob, WorkerContext};

const WORKER_NAME: &str = "twin-tileset-worker";

/// Apalis-backed [`JobQueue`]
#[derive(Clone)]
pub struct ApalisJobQueue {
    storage: PostgresStorage<TilesetUploadJob>,
}

impl ApalisJobQueue {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            storage: PostgresStorage::new(pool),
        }
    }

    /// Create the apalis schema if it is missing.
    pub async fn setup_schema(pool: &PgPool) -> Result<()> {
        info!("Setting up PostgreSQL storage for apalis");
        PostgresStorage::setup(pool)
            .await
            .context("Failed to set up apalis schema")?;
        Ok(())
    }

    /// Spawn the worker monitor
    ///
    /// Monitor::register expects a factory closure that creates workers; each
    /// worker receives the shared [`WorkerContext`] as job data.
    pub fn start_worker(&self, ctx: WorkerContext) -> JoinHandle<()> {
        let storage = self.storage.clone();

        tokio::spawn(async move {
            info!("Upload job worker started");
            if let Err(e) = Monitor::new()
                .register(move |_index| {
                    WorkerBuilder::new(WORKER_NAME)
                        .backend(storage.clone())
                        .data(ctx.clone())
                        .build(run_upload_job)
                })
                .run()
                .await
            {
                error!("Upload job worker error: {:?}", e);
            }
            info!("Upload job worker stopped");
        })
    }
}

#[async_trait]
impl JobQueue for ApalisJobQueue {
    async fn enqueue(&self, job_id: &str, job: TilesetUploadJob) -> Result<JobHandle> {
        let mut storage = self.storage.clone();
        storage
            .push(job)
            .await
            .with_context(|| format!("Failed to push job {}", job_id))?;

        Ok(JobHandle {
            id: job_id.to_string(),
        })
    }
}

/// Apalis entry point for [`TilesetUploadJob`]
async fn run_upload_job(job: TilesetUploadJob, ctx: Data<WorkerContext>) -> Result<()> {
    let record_id = job.record_id;
    let status = process_tileset_upload(&ctx, job).await?;
    info!(asset_id = record_id, status = %status, "Upload job finished");
    Ok(())
}
