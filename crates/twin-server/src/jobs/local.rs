//! In-process job queue
//!
//! Jobs travel over an unbounded tokio channel to a single spawned worker.
//! Nothing survives a restart; a `pending` row left behind by a crash stays
//! pending.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{process_tileset_upload, JobHandle, JobQueue, TilesetUploadJob, WorkerContext};

#[derive(Clone)]
pub struct LocalJobQueue {
    sender: mpsc::UnboundedSender<(String, TilesetUploadJob)>,
}

impl LocalJobQueue {
    /// Spawn the worker and return the queue feeding it.
    ///
    /// The worker stops once every queue clone has been dropped.
    pub fn start(ctx: WorkerContext) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(String, TilesetUploadJob)>();

        let handle = tokio::spawn(async move {
            info!("Local upload worker started");
            while let Some((job_id, job)) = receiver.recv().await {
                match process_tileset_upload(&ctx, job).await {
                    Ok(status) => info!(job_id = %job_id, status = %status, "Upload job finished"),
                    Err(e) => error!(job_id = %job_id, error = %e, "Upload job errored"),
                }
            }
            info!("Local upload worker stopped");
        });

        (Self { sender }, handle)
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, job_id: &str, job: TilesetUploadJob) -> Result<JobHandle> {
        self.sender
            .send((job_id.to_string(), job))
            .map_err(|_| anyhow!("Local upload worker is not running"))?;

        Ok(JobHandle {
            id: job_id.to_string(),
        })
    }
}
