use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Base URL clients use to fetch objects. Derived from the endpoint when unset.
    pub public_url: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "twin-assets".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            public_url: env::var("S3_PUBLIC_URL").ok(),
        };

        if config.bucket.trim().is_empty() {
            anyhow::bail!("S3_BUCKET cannot be empty");
        }

        Ok(config)
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            public_url: None,
        }
    }

    /// Base URL for public object links, without a trailing slash.
    pub fn public_base_url(&self) -> String {
        if let Some(ref url) = self.public_url {
            return url.trim_end_matches('/').to_string();
        }

        match self.endpoint {
            Some(ref endpoint) if self.path_style => {
                format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)
            },
            Some(ref endpoint) => {
                let endpoint = endpoint.trim_end_matches('/');
                match endpoint.split_once("://") {
                    Some((scheme, host)) => format!("{}://{}.{}", scheme, self.bucket, host),
                    None => format!("https://{}.{}", self.bucket, endpoint),
                }
            },
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}
