//! Amazon S3 object store

use super::ObjectStore;
use crate::error::{Result, StemsplitError};
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// S3 bucket accessed from synchronous pipeline code
///
/// Calls are driven on the given runtime handle with `block_on`, so the
/// store must be used from a thread that is not itself a runtime worker
/// (for example inside `spawn_blocking`).
pub struct S3Store {
    client: Client,
    bucket: String,
    handle: Handle,
}

impl S3Store {
    /// Load AWS configuration from the environment and check it is usable
    ///
    /// Fails with `StorageConfigError` when the bucket, region or
    /// credentials are missing.
    pub async fn connect(bucket: Option<&str>, handle: Handle) -> Result<Self> {
        let bucket = bucket
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StemsplitError::StorageConfig("No bucket configured".to_string()))?
            .to_string();

        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let region = config
            .region()
            .ok_or_else(|| StemsplitError::StorageConfig("No AWS region configured".to_string()))?
            .to_string();

        let provider = config.credentials_provider().ok_or_else(|| {
            StemsplitError::StorageConfig("No AWS credentials provider".to_string())
        })?;
        provider.provide_credentials().await.map_err(|e| {
            StemsplitError::StorageConfig(format!("AWS credentials unavailable: {}", e))
        })?;

        info!("Remote delivery to s3://{} ({})", bucket, region);

        Ok(Self {
            client: Client::new(&config),
            bucket,
            handle,
        })
    }
}

impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        debug!("PUT s3://{}/{} ({} bytes)", self.bucket, key, body.len());
        self.handle
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| StemsplitError::upload(format!("PutObject {}: {}", key, e)))?;
        Ok(())
    }

    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StemsplitError::upload(format!("Invalid link lifetime: {}", e)))?;

        let request = self
            .handle
            .block_on(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(presigning),
            )
            .map_err(|e| StemsplitError::upload(format!("Signing URL for {}: {}", key, e)))?;

        Ok(request.uri().to_string())
    }
}
