//! Twin Server Library
#![recursion_limit = "256"]
//!
//! HTTP server for the digital twin's binary assets: images, 3D tilesets and
//! map layers.
//!
//! # Overview
//!
//! - **Asset managers**: one router per configured collection, sharing CRUD,
//!   access control and batch behaviour
//! - **Tileset extraction**: ZIP archives unpacked into blob storage,
//!   all-or-nothing
//! - **Background uploads**: large tilesets processed by a job queue with a
//!   polling endpoint
//! - **Storage**: S3-compatible blob storage and PostgreSQL metadata, each with
//!   an in-memory alternative
//!
//! # Architecture
//!
//! Features follow a command/query split:
//!
//! - **Commands** (Write Operations): upload, update, delete and their batch
//!   forms, ownership-checked
//! - **Queries** (Read Operations): list, fetch and status, visibility-checked
//!
//! Collaborators sit behind traits (`BlobStore`, `MetadataStore`, `JobQueue`,
//! `UserStore`, `IdentityProvider`) so handlers run unchanged over PostgreSQL,
//! S3 and apalis in production and over in-memory adapters in tests.
//!
//! # Example
//!
//! ```no_run
//! use twin_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     api::serve(config).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod storage;

// Re-export commonly used types
pub use error::{AppError, AppResult};
