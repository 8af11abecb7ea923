//! Unified error types for stemsplit
//!
//! Error strategy:
//! - Request errors (validation, separation, delivery): abort the request,
//!   clean up, answer with `{"error": ...}`
//! - Transcode errors: recovered per stem by falling back to WAV, see
//!   [`TranscodeError`]
//! - Cleanup problems: logged as warnings, never surfaced
//!
//! Oversized archives are not errors at all; they are a regular
//! [`Outcome`](crate::pipeline::Outcome) variant.

use thiserror::Error;

/// Input containers the decoder understands, for helpful error messages
pub const SUPPORTED_FORMATS: &str = "WAV, MP3, FLAC, OGG/Vorbis, AAC/M4A";

/// Top-level error type for stemsplit operations
#[derive(Debug, Error)]
pub enum StemsplitError {
    // =========================================================================
    // Request errors - caller must fix the request
    // =========================================================================
    #[error("Invalid request: {0}")]
    Validation(String),

    // =========================================================================
    // Separator errors
    // =========================================================================
    #[error("Failed to load {stems}-stems model: {reason}\n  Tip: Set STEMSPLIT_MODEL_DIR to a directory containing spleeter-{stems}stems.onnx")]
    ModelLoad { stems: u8, reason: String },

    #[error("Separation failed: {reason}\n  Supported input formats: {SUPPORTED_FORMATS}")]
    Separation { reason: String },

    // =========================================================================
    // Packaging errors
    // =========================================================================
    #[error("Failed to build archive: {reason}")]
    Archive { reason: String },

    // =========================================================================
    // Delivery errors
    // =========================================================================
    #[error("Object storage is not configured: {0}\n  Tip: Set STEMSPLIT_S3_BUCKET, AWS_REGION and AWS credentials")]
    StorageConfig(String),

    #[error("Upload failed: {reason}")]
    Upload { reason: String },

    // =========================================================================
    // Process errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stemsplit operations
pub type Result<T> = std::result::Result<T, StemsplitError>;

impl StemsplitError {
    /// Taxonomy name of this error, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            StemsplitError::Validation(_) => "ValidationError",
            StemsplitError::ModelLoad { .. } => "ModelLoadError",
            StemsplitError::Separation { .. } => "SeparationError",
            StemsplitError::Archive { .. } => "ArchiveError",
            StemsplitError::StorageConfig(_) => "StorageConfigError",
            StemsplitError::Upload { .. } => "UploadError",
            StemsplitError::Config(_) => "ConfigError",
            StemsplitError::Io(_) => "IoError",
        }
    }

    /// Returns true if the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(self, StemsplitError::Validation(_))
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        StemsplitError::Validation(reason.into())
    }

    pub fn separation(reason: impl Into<String>) -> Self {
        StemsplitError::Separation {
            reason: reason.into(),
        }
    }

    pub fn model_load(stems: u8, reason: impl Into<String>) -> Self {
        StemsplitError::ModelLoad {
            stems,
            reason: reason.into(),
        }
    }

    pub fn archive(reason: impl Into<String>) -> Self {
        StemsplitError::Archive {
            reason: reason.into(),
        }
    }

    pub fn upload(reason: impl Into<String>) -> Self {
        StemsplitError::Upload {
            reason: reason.into(),
        }
    }
}

/// Failure to compress a single stem
///
/// Non-fatal: the orchestrator keeps the lossless rendition of the stem.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("MP3 encoding is not available in this build")]
    Unavailable,

    #[error("Encoder setup failed: {0}")]
    Setup(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Empty audio buffer")]
    EmptyInput,
}
