//! Runtime configuration settings

use crate::error::{Result, StemsplitError};
use crate::types::DeliveryMode;
use std::path::PathBuf;

/// Platform response limit for inline delivery (10 MiB)
pub const DEFAULT_INLINE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

/// Single-request upload limit of the object store (5 GiB)
pub const DEFAULT_REMOTE_LIMIT_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Default signed link lifetime in hours
pub const DEFAULT_EXPIRE_HOURS: f64 = 1.0;

/// Longest signed link lifetime the object store accepts (7 days)
pub const MAX_EXPIRE_HOURS: f64 = 168.0;

/// Default model segment length in seconds
pub const DEFAULT_SEGMENT_SECONDS: f32 = 10.0;

/// Runtime settings for the request handler
#[derive(Debug, Clone)]
pub struct Settings {
    /// Delivery mode used when a request does not name one
    pub delivery: DeliveryMode,
    /// Root for per-request workspaces
    pub scratch_dir: PathBuf,
    /// Explicit model directory
    pub model_dir: Option<PathBuf>,
    /// Base URL for model downloads
    pub model_url: Option<String>,
    /// Bucket for remote delivery
    pub bucket: Option<String>,
    /// Key prefix for uploaded archives
    pub key_prefix: String,
    /// Archive size limit for inline delivery
    pub inline_limit_bytes: u64,
    /// Archive size limit for remote delivery
    pub remote_limit_bytes: u64,
    /// Model segment length in seconds
    pub segment_seconds: f32,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_cli(cli: &super::cli::Cli) -> Result<Self> {
        let delivery = DeliveryMode::parse(&cli.delivery).ok_or_else(|| {
            StemsplitError::Config(format!("Unknown delivery mode '{}'", cli.delivery))
        })?;

        if cli.max_inline_mb == 0 {
            return Err(StemsplitError::Config(
                "--max-inline-mb must be at least 1".to_string(),
            ));
        }

        if !(cli.segment_secs.is_finite() && cli.segment_secs >= 2.0) {
            return Err(StemsplitError::Config(format!(
                "--segment-secs must be at least 2 seconds, got {}",
                cli.segment_secs
            )));
        }

        let inline_limit_bytes = cli.max_inline_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            StemsplitError::Config(format!(
                "--max-inline-mb {} is too large",
                cli.max_inline_mb
            ))
        })?;

        Ok(Self {
            delivery,
            scratch_dir: cli.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
            model_dir: cli.model_dir.clone(),
            model_url: cli.model_url.clone(),
            bucket: cli.bucket.clone().filter(|b| !b.trim().is_empty()),
            key_prefix: cli.key_prefix.trim_matches('/').to_string(),
            inline_limit_bytes,
            remote_limit_bytes: DEFAULT_REMOTE_LIMIT_BYTES,
            segment_seconds: cli.segment_secs,
        })
    }

    /// Size limit that applies to a delivery mode
    pub fn size_limit(&self, mode: DeliveryMode) -> u64 {
        match mode {
            DeliveryMode::Inline => self.inline_limit_bytes,
            DeliveryMode::Remote => self.remote_limit_bytes,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::Inline,
            scratch_dir: std::env::temp_dir(),
            model_dir: None,
            model_url: None,
            bucket: None,
            key_prefix: "stems".to_string(),
            inline_limit_bytes: DEFAULT_INLINE_LIMIT_BYTES,
            remote_limit_bytes: DEFAULT_REMOTE_LIMIT_BYTES,
            segment_seconds: DEFAULT_SEGMENT_SECONDS,
        }
    }
}
