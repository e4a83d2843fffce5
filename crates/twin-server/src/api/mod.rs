//! Application assembly
//!
//! Builds the configured backends, mounts the asset managers and serves the
//! router with graceful shutdown.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, task::JoinHandle};
use tower_http::compression::CompressionLayer;
use tracing::info;

use crate::auth::{CallerResolver, GatewayHeaderProvider};
use crate::config::{Config, MetadataBackend, QueueBackend, StorageBackend};
use crate::db::{
    self, MemoryMetadataStore, MemoryUserStore, MetadataStore, PgMetadataStore, PgUserStore,
    UserStore,
};
use crate::features::{self, assets::AssetServices};
use crate::jobs::{ApalisJobQueue, JobQueue, LocalJobQueue, WorkerContext};
use crate::middleware;
use crate::storage::{config::StorageConfig, BlobStore, MemoryBlobStore, S3Storage};

/// Base URL reported for blobs held by the in-memory store.
pub const MEMORY_BLOB_BASE_URL: &str = "memory://twin";

/// Application state for server-level routes
#[derive(Clone, Default)]
pub struct AppState {
    /// Present when any backend runs on PostgreSQL.
    pub db: Option<PgPool>,
}

/// Everything `serve` needs, built from [`Config`]
pub struct Application {
    pub state: AppState,
    pub services: AssetServices,
    pub workers: Vec<JoinHandle<()>>,
}

/// Connect and wire every backend selected in `config.backends`.
pub async fn build(config: &Config) -> Result<Application> {
    let backends = &config.backends;

    let needs_db = backends.metadata == MetadataBackend::Postgres
        || backends.queue == QueueBackend::Postgres;
    let db = if needs_db {
        let pool = db::create_pool(&config.database)
            .await
            .context("Failed to connect to the database")?;
        db::run_migrations(&pool).await?;
        Some(pool)
    } else {
        None
    };

    let blobs: Arc<dyn BlobStore> = match backends.storage {
        StorageBackend::S3 => {
            let storage_config = StorageConfig::from_env()?;
            Arc::new(S3Storage::new(storage_config).await?)
        },
        StorageBackend::Memory => Arc::new(MemoryBlobStore::new(MEMORY_BLOB_BASE_URL)),
    };
    info!(backend = ?backends.storage, "Blob storage initialized");

    let (metadata, users): (Arc<dyn MetadataStore>, Arc<dyn UserStore>) =
        match (backends.metadata, db.as_ref()) {
            (MetadataBackend::Postgres, Some(pool)) => (
                Arc::new(PgMetadataStore::new(pool.clone())),
                Arc::new(PgUserStore::new(pool.clone())),
            ),
            (MetadataBackend::Postgres, None) => {
                anyhow::bail!("PostgreSQL metadata backend requires a database connection")
            },
            (MetadataBackend::Memory, _) => {
                (Arc::new(MemoryMetadataStore::new()), Arc::new(MemoryUserStore::new()))
            },
        };
    info!(backend = ?backends.metadata, "Metadata store initialized");

    let ctx = WorkerContext {
        blobs: blobs.clone(),
        metadata: metadata.clone(),
    };
    let mut workers = Vec::new();
    let queue: Option<Arc<dyn JobQueue>> = match (backends.queue, db.as_ref()) {
        (QueueBackend::Postgres, Some(pool)) => {
            ApalisJobQueue::setup_schema(pool).await?;
            let queue = ApalisJobQueue::new(pool);
            workers.push(queue.start_worker(ctx));
            Some(Arc::new(queue))
        },
        (QueueBackend::Postgres, None) => {
            anyhow::bail!("PostgreSQL job queue requires a database connection")
        },
        (QueueBackend::Local, _) => {
            let (queue, worker) = LocalJobQueue::start(ctx);
            workers.push(worker);
            Some(Arc::new(queue))
        },
        (QueueBackend::Disabled, _) => None,
    };
    info!(backend = ?backends.queue, "Job queue initialized");

    let callers = CallerResolver::new(config.auth.policy(), Arc::new(GatewayHeaderProvider), users);

    Ok(Application {
        state: AppState { db },
        services: AssetServices {
            blobs,
            metadata,
            queue,
            callers,
            uploads: config.uploads.clone(),
        },
        workers,
    })
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, services: AssetServices, config: &Config) -> Router {
    let api_v1 = features::router(services, &config.managers, config.uploads.max_upload_bytes);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(state)
        .nest(features::assets::API_PREFIX, api_v1)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

pub async fn serve(config: Config) -> Result<()> {
    let app = build(&config).await?;
    let router = create_router(app.state, app.services, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    for worker in app.workers {
        worker.abort();
    }

    info!("Server shut down gracefully");
    Ok(())
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Twin Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Response {
    let Some(pool) = state.db.as_ref() else {
        return (StatusCode::OK, Json(json!({ "status": "healthy", "database": "none" })))
            .into_response();
    };

    match db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "disconnected" })),
            )
                .into_response()
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
