//! Feature modules implementing the Twin asset API
//!
//! # Features
//!
//! - **assets**: upload, fetch, update and delete for every configured
//!   collection, plus batch operations and tileset upload tracking
//! - **shared**: request validation helpers
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations (upload, update, delete)
//! - `queries/` - Read operations (get, list, status)
//! - `routes.rs` - HTTP route definitions
//! - `types.rs` - Response types

pub mod assets;
pub mod shared;

use axum::{extract::DefaultBodyLimit, Router};

use assets::{asset_routes, AssetManager, AssetManagerConfig, AssetServices};

/// Creates the `/api/v1` router with one nested router per manager
///
/// Each manager is mounted at its own endpoint (`/assets`, `/tilesets`, ...)
/// with its own [`AssetManager`] state. Request bodies are capped at
/// `max_upload_bytes`.
pub fn router(
    services: AssetServices,
    managers: &[AssetManagerConfig],
    max_upload_bytes: usize,
) -> Router<()> {
    managers.iter().cloned().fold(Router::new(), |router, config| {
        let endpoint = format!("/{}", config.endpoint.trim_matches('/'));
        let kind = config.kind;
        tracing::debug!(manager = %config.name, endpoint = %endpoint, "Mounting asset manager");

        let manager = AssetManager::new(services.clone(), config);
        router.nest(
            &endpoint,
            asset_routes(kind)
                .with_state(manager)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
    })
}
