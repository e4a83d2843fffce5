//! Twin Server - Main entry point

use anyhow::Result;
use tracing::info;
use twin_common::logging::{init_logging, LogConfig};

use twin_server::{api, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .log_file_prefix("twin-server")
        .filter_directives("twin_server=debug,tower_http=debug,sqlx=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    // Keep the guard alive so buffered file output is flushed on exit
    let _log_guard = init_logging(&log_config)?;

    info!("Starting Twin Server");

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        managers = config.managers.len(),
        "Configuration loaded"
    );

    api::serve(config).await
}
