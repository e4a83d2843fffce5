//! Configuration management
//!
//! All settings come from environment variables (a `.env` file is honoured
//! through `dotenvy`). Unset or unparsable values fall back to the defaults
//! below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::AuthPolicy;
use crate::features::assets::{AssetManagerConfig, ASYNC_UPLOAD_THRESHOLD_BYTES};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/twin";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Role that grants write access to every asset.
pub const DEFAULT_ADMIN_ROLE: &str = "admin";

/// Largest request body accepted by upload routes (2 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Archive entries written to storage concurrently.
pub const DEFAULT_EXTRACT_BATCH_SIZE: usize = 10;

/// Batch items processed concurrently.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub backends: BackendConfig,
    pub managers: Vec<AssetManagerConfig>,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Every request acts as one shared "anonymous" user. Local development only.
    pub disabled: bool,
    pub admin_role: String,
}

impl AuthConfig {
    pub fn policy(&self) -> AuthPolicy {
        if self.disabled {
            AuthPolicy::Anonymous
        } else {
            AuthPolicy::Enforced {
                admin_role: self.admin_role.clone(),
            }
        }
    }
}

/// Upload intake and processing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub async_threshold_bytes: u64,
    pub max_upload_bytes: usize,
    pub temp_dir: PathBuf,
    pub extract_batch_size: usize,
    pub batch_concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            async_threshold_bytes: ASYNC_UPLOAD_THRESHOLD_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            temp_dir: std::env::temp_dir().join("twin-uploads"),
            extract_batch_size: DEFAULT_EXTRACT_BATCH_SIZE,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// apalis over the metadata database
    Postgres,
    /// In-process channel and worker task
    Local,
    /// No queue: every upload is processed inline
    Disabled,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => Err(format!("Unknown storage backend '{}'", other)),
        }
    }
}

impl FromStr for MetadataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("Unknown metadata backend '{}'", other)),
        }
    }
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "apalis" => Ok(Self::Postgres),
            "local" => Ok(Self::Local),
            "none" | "disabled" => Ok(Self::Disabled),
            other => Err(format!("Unknown job queue backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub storage: StorageBackend,
    pub metadata: MetadataBackend,
    pub queue: QueueBackend,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::S3,
            metadata: MetadataBackend::Postgres,
            queue: QueueBackend::Postgres,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let uploads = UploadConfig::default();

        let config = Config {
            server: ServerConfig {
                host: env_string("TWIN_HOST", DEFAULT_SERVER_HOST),
                port: env_or("TWIN_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "TWIN_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: env_string("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            auth: AuthConfig {
                disabled: env_or("TWIN_AUTH_DISABLED", false),
                admin_role: env_string("TWIN_ADMIN_ROLE", DEFAULT_ADMIN_ROLE),
            },
            uploads: UploadConfig {
                async_threshold_bytes: env_or(
                    "TWIN_ASYNC_UPLOAD_THRESHOLD",
                    uploads.async_threshold_bytes,
                ),
                max_upload_bytes: env_or("TWIN_MAX_UPLOAD_BYTES", uploads.max_upload_bytes),
                temp_dir: std::env::var("TWIN_UPLOAD_TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(uploads.temp_dir),
                extract_batch_size: env_or("TWIN_EXTRACT_BATCH_SIZE", uploads.extract_batch_size),
                batch_concurrency: env_or("TWIN_BATCH_CONCURRENCY", uploads.batch_concurrency),
            },
            backends: BackendConfig {
                storage: env_or("TWIN_STORAGE_BACKEND", StorageBackend::S3),
                metadata: env_or("TWIN_METADATA_BACKEND", MetadataBackend::Postgres),
                queue: env_or("TWIN_JOB_QUEUE", QueueBackend::Postgres),
            },
            managers: AssetManagerConfig::defaults(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.backends.metadata == MetadataBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }

            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }

            if self.database.min_connections > self.database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections,
                    self.database.max_connections
                );
            }
        }

        if self.backends.queue == QueueBackend::Postgres
            && self.backends.metadata != MetadataBackend::Postgres
        {
            anyhow::bail!("The postgres job queue requires the postgres metadata backend");
        }

        if self.uploads.extract_batch_size == 0 {
            anyhow::bail!("TWIN_EXTRACT_BATCH_SIZE must be greater than 0");
        }

        if self.uploads.batch_concurrency == 0 {
            anyhow::bail!("TWIN_BATCH_CONCURRENCY must be greater than 0");
        }

        if self.auth.admin_role.trim().is_empty() {
            anyhow::bail!("TWIN_ADMIN_ROLE cannot be empty");
        }

        if self.managers.is_empty() {
            anyhow::bail!("At least one asset manager must be configured");
        }

        let mut endpoints = std::collections::HashSet::new();
        for manager in &self.managers {
            manager.validate()?;
            if !endpoints.insert(manager.endpoint.as_str()) {
                anyhow::bail!("Duplicate asset manager endpoint '{}'", manager.endpoint);
            }
        }

        if self.auth.disabled {
            tracing::warn!("Authentication is disabled - all requests act as the anonymous user");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            auth: AuthConfig {
                disabled: false,
                admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            },
            uploads: UploadConfig::default(),
            backends: BackendConfig::default(),
            managers: AssetManagerConfig::defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.uploads.async_threshold_bytes, 50 * 1024 * 1024);
        assert_eq!(config.uploads.extract_batch_size, 10);
    }

    #[test]
    fn test_invalid_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_connection_pool() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        config.database.max_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_queue_needs_postgres_metadata() {
        let mut config = Config::default();
        config.backends.metadata = MetadataBackend::Memory;
        assert!(config.validate().is_err());

        config.backends.queue = QueueBackend::Local;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_endpoints_rejected() {
        let mut config = Config::default();
        let first = config.managers[0].clone();
        config.managers.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_policy_mapping() {
        let mut auth = AuthConfig {
            disabled: false,
            admin_role: "ops".to_string(),
        };
        assert!(matches!(
            auth.policy(),
            AuthPolicy::Enforced { ref admin_role } if admin_role == "ops"
        ));

        auth.disabled = true;
        assert!(matches!(auth.policy(), AuthPolicy::Anonymous));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!("memory".parse::<MetadataBackend>().unwrap(), MetadataBackend::Memory);
        assert_eq!("none".parse::<QueueBackend>().unwrap(), QueueBackend::Disabled);
        assert!("redis".parse::<QueueBackend>().is_err());
    }
}
