use anyhow::{anyhow, Context};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
    Client,
};
use tracing::{debug, info, instrument, warn};

use super::{
    config::StorageConfig, normalize_key, normalize_prefix, timestamped_key, BlobStore,
    StorageError, StorageResult,
};

/// S3 accepts at most this many keys per DeleteObjects call.
const DELETE_CHUNK_SIZE: usize = 1000;

/// S3 / MinIO backed [`BlobStore`]
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> anyhow::Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            path_style = config.path_style,
            "Initializing S3 storage"
        );

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "twin-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        let public_base_url = config.public_base_url();

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
            public_base_url,
        })
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let size = data.len();
        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload to S3: {}", key))?;

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .with_context(|| format!("Failed to list S3 objects under {}", prefix))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> StorageResult<()> {
        for chunk in keys.chunks(DELETE_CHUNK_SIZE) {
            let objects = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .context("Failed to build S3 object identifier")
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .context("Failed to build S3 delete request")?;

            let response = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .context("Failed to delete S3 objects")?;

            let errors = response.errors();
            if !errors.is_empty() {
                for error in errors {
                    warn!(key = ?error.key(), message = ?error.message(), "S3 refused delete");
                }
                return Err(StorageError::Backend(anyhow!(
                    "{} of {} objects could not be deleted",
                    errors.len(),
                    chunk.len()
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn save(&self, data: Vec<u8>, folder: &str, filename: &str) -> StorageResult<String> {
        let key = timestamped_key(folder, filename)?;
        self.put(&key, data).await?;
        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);
        Ok(key)
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn save_with_path(&self, data: Vec<u8>, path: &str) -> StorageResult<String> {
        let key = normalize_key(path)?;
        self.put(&key, data).await?;
        Ok(key)
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, path: &str) -> StorageResult<Vec<u8>> {
        let key = normalize_key(path)?;
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    return Err(StorageError::NotFound(key));
                }
                return Err(StorageError::Backend(
                    anyhow::Error::new(e).context(format!("Failed to download from S3: {}", key)),
                ));
            },
        };

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = normalize_key(path)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to delete from S3: {}", key))?;

        info!("Successfully deleted s3://{}/{}", self.bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_by_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let prefix = normalize_prefix(prefix)?;
        let keys = self.list_keys(&prefix).await?;

        if keys.is_empty() {
            debug!("No objects under s3://{}/{}", self.bucket, prefix);
            return Ok(0);
        }

        self.delete_keys(&keys).await?;
        info!(count = keys.len(), "Deleted objects under s3://{}/{}", self.bucket, prefix);

        Ok(keys.len())
    }

    #[instrument(skip(self, paths), fields(count = paths.len()))]
    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let keys = paths
            .iter()
            .map(|p| normalize_key(p))
            .collect::<StorageResult<Vec<_>>>()?;

        self.delete_keys(&keys).await
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
    }
}
