//! stemsplit - Serverless music stem separation worker
//!
//! Accepts a base64-encoded audio file, separates it into 2, 4 or 5 stems
//! with a pretrained model, optionally compresses each stem to MP3,
//! packages the stems into a zip archive and returns it either inline or
//! as a time-limited signed object-storage link.
//!
//! # Architecture
//!
//! - `config`: CLI argument parsing and runtime settings
//! - `audio`: Decoding (symphonia), WAV rendering (hound), MP3 transcoding (LAME)
//! - `separation`: Model backends and the per-process model cache
//! - `archive`: Zip packaging with a per-entry manifest
//! - `policy`: Archive size gate with remediation suggestions
//! - `delivery`: Inline base64 or S3 upload with a presigned URL
//! - `pipeline`: Request validation, workspace handling and orchestration
//!
//! # Building
//!
//! Model inference is behind the `onnx` feature, which pulls in ONNX
//! Runtime. Deployable builds use:
//!
//! ```text
//! cargo build --release --features onnx
//! ```
//!
//! The default build (`mp3` only) serves requests but every separation
//! fails with `ModelLoadError`; it is meant for tests and tooling.
//!
//! # Example
//!
//! ```no_run
//! use stemsplit::config::Settings;
//! use stemsplit::delivery::StorageBackend;
//! use stemsplit::pipeline::Handler;
//!
//! let handler = Handler::from_settings(
//!     Settings::default(),
//!     StorageBackend::Unavailable("inline only".to_string()),
//! );
//! let response = handler.handle(&serde_json::json!({
//!     "audio_base64": "...",
//!     "stems": 2,
//! }));
//! println!("{}", response.to_json());
//! ```

pub mod archive;
pub mod audio;
pub mod config;
pub mod delivery;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod separation;
pub mod types;

// Re-export key types at crate root
pub use error::{Result, StemsplitError, TranscodeError};
pub use pipeline::{Handler, Outcome, Response, SeparationRequest};
pub use types::{Bitrate, DeliveryMode, OutputFormat, StemCount, StemName, StemSet, StereoBuffer};
