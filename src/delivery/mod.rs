//! Archive delivery
//!
//! Two mutually exclusive strategies: inline (base64 in the response body)
//! or remote (upload to object storage plus a time-bounded signed URL).

pub mod s3;

pub use s3::S3Store;

use crate::error::{Result, StemsplitError};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Content type of uploaded archives
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Object storage used for remote delivery
pub trait ObjectStore: Send + Sync {
    /// Bucket name reported back to the caller
    fn bucket(&self) -> &str;

    /// Upload an object
    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Produce a signed GET URL valid for `expires_in`
    fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Remote delivery target as resolved at startup
#[derive(Clone)]
pub enum StorageBackend {
    Configured(Arc<dyn ObjectStore>),
    /// Storage could not be configured; the reason is reported per request
    Unavailable(String),
}

impl StorageBackend {
    /// The configured store, or a `StorageConfigError`
    pub fn store(&self) -> Result<&dyn ObjectStore> {
        match self {
            StorageBackend::Configured(store) => Ok(store.as_ref()),
            StorageBackend::Unavailable(reason) => {
                Err(StemsplitError::StorageConfig(reason.clone()))
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, StorageBackend::Configured(_))
    }
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Configured(store) => {
                f.debug_tuple("Configured").field(&store.bucket()).finish()
            }
            StorageBackend::Unavailable(reason) => {
                f.debug_tuple("Unavailable").field(reason).finish()
            }
        }
    }
}

/// How the archive reached the caller
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryResult {
    Inline {
        payload: String,
    },
    Remote {
        url: String,
        key: String,
        bucket: String,
        expires_at: DateTime<Utc>,
    },
}

impl DeliveryResult {
    /// Expiry as ISO-8601 UTC (`2024-05-01T12:00:00Z`)
    pub fn expires_at_iso(&self) -> Option<String> {
        match self {
            DeliveryResult::Remote { expires_at, .. } => {
                Some(expires_at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            DeliveryResult::Inline { .. } => None,
        }
    }
}

/// Encode the archive into the response body
pub fn deliver_inline(archive: &[u8]) -> DeliveryResult {
    DeliveryResult::Inline {
        payload: base64::engine::general_purpose::STANDARD.encode(archive),
    }
}

/// Upload the archive and sign a retrieval link
pub fn deliver_remote(
    store: &dyn ObjectStore,
    archive: Vec<u8>,
    key_prefix: &str,
    request_id: &str,
    expire_hours: f64,
) -> Result<DeliveryResult> {
    let key = archive_key(key_prefix, request_id, Utc::now());
    let expires_in = Duration::from_secs_f64(expire_hours * 3600.0);
    let size = archive.len();

    store.put(&key, archive, ARCHIVE_CONTENT_TYPE)?;
    info!("Uploaded {} bytes to {}/{}", size, store.bucket(), key);

    let url = store.presign_get(&key, expires_in)?;
    let expires_at = Utc::now()
        + chrono::Duration::from_std(expires_in)
            .map_err(|e| StemsplitError::upload(format!("Invalid link lifetime: {}", e)))?;

    Ok(DeliveryResult::Remote {
        url,
        key,
        bucket: store.bucket().to_string(),
        expires_at,
    })
}

/// Storage key for an archive: `{prefix}/{YYYYmmdd_HHMMSS}_{id}.zip`
pub fn archive_key(prefix: &str, request_id: &str, at: DateTime<Utc>) -> String {
    let name = format!("{}_{}.zip", at.format("%Y%m%d_%H%M%S"), request_id);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}
