//! Request orchestration
//!
//! Drives one request through a linear state machine:
//!
//! ```text
//! Received -> Validated -> Separated -> Archived -> SizeChecked -> Delivered -> Cleaned
//! ```
//!
//! Any failure moves to `Failed`. The request workspace is removed on every
//! exit path before the response is produced.

use super::request::SeparationRequest;
use super::response::Response;
use super::workspace::RequestWorkspace;
use crate::archive::{ArchiveBuilder, ArchiveManifest};
use crate::audio::{self, Transcoder};
use crate::config::Settings;
use crate::delivery::{self, DeliveryResult, StorageBackend};
use crate::error::{Result, StemsplitError};
use crate::policy::{GateDecision, SizePolicy, SizeRejection};
use crate::separation::{OnnxModelLoader, SeparationContext};
use crate::types::{Bitrate, DeliveryMode, OutputFormat, Stem, StemCount};
use serde_json::Value;
use std::fs;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Pipeline stage, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Separated,
    Archived,
    SizeChecked,
    Delivered,
    Cleaned,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Separated => "separated",
            Stage::Archived => "archived",
            Stage::SizeChecked => "size_checked",
            Stage::Delivered => "delivered",
            Stage::Cleaned => "cleaned",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Archive delivered to the caller
#[derive(Debug)]
pub struct Delivered {
    pub delivery: DeliveryResult,
    pub manifest: ArchiveManifest,
    pub size_bytes: u64,
    pub format: OutputFormat,
    pub bitrate: Bitrate,
    pub stems: StemCount,
}

/// Archive built but over the size limit
#[derive(Debug)]
pub struct Rejected {
    pub rejection: SizeRejection,
    pub manifest: ArchiveManifest,
    pub delivery: DeliveryMode,
}

/// How a request ended
#[derive(Debug)]
pub enum Outcome {
    Delivered(Delivered),
    Rejected(Rejected),
    Failed(StemsplitError),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Delivered(_) => "delivered",
            Outcome::Rejected(_) => "size_limit_exceeded",
            Outcome::Failed(e) => e.kind(),
        }
    }
}

/// Request handler shared by every invocation in this process
pub struct Handler {
    settings: Settings,
    separator: SeparationContext,
    transcoder: Box<dyn Transcoder>,
    storage: StorageBackend,
}

impl Handler {
    pub fn new(
        settings: Settings,
        separator: SeparationContext,
        transcoder: Box<dyn Transcoder>,
        storage: StorageBackend,
    ) -> Self {
        Self {
            settings,
            separator,
            transcoder,
            storage,
        }
    }

    /// Production wiring: ONNX models and LAME transcoding
    pub fn from_settings(settings: Settings, storage: StorageBackend) -> Self {
        let loader = OnnxModelLoader::new(
            settings.model_dir.clone(),
            settings.model_url.clone(),
            settings.segment_seconds,
        );
        Self::new(
            settings,
            SeparationContext::new(Box::new(loader)),
            Box::new(audio::LameTranscoder::new()),
            storage,
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn separator(&self) -> &SeparationContext {
        &self.separator
    }

    /// Handle one request event and build the response body
    pub fn handle(&self, event: &Value) -> Response {
        let span = info_span!("request", id = tracing::field::Empty);
        let _enter = span.enter();
        let start = Instant::now();
        debug!(stage = %Stage::Received, "Request received");

        let request = match SeparationRequest::from_event(event, self.settings.delivery) {
            Ok(request) => request,
            Err(e) => {
                if e.is_client_error() {
                    warn!(stage = %Stage::Failed, kind = e.kind(), "{}", e);
                } else {
                    error!(stage = %Stage::Failed, kind = e.kind(), "{}", e);
                }
                return Response::error(&e);
            }
        };
        span.record("id", request.id.as_str());

        let outcome = self.process(&request);
        info!(
            outcome = outcome.label(),
            "Request finished in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Response::from(outcome)
    }

    /// Run a validated request; the workspace is gone when this returns
    pub fn process(&self, request: &SeparationRequest) -> Outcome {
        info!(
            stage = %Stage::Validated,
            stems = request.stems.count(),
            format = request.format.extension(),
            bitrate = request.bitrate.as_str(),
            delivery = %request.delivery,
            "Received {} bytes of audio",
            request.audio.len()
        );

        let mut workspace =
            match RequestWorkspace::create(&self.settings.scratch_dir, &request.id) {
                Ok(ws) => ws,
                Err(e) => {
                    error!(stage = %Stage::Failed, kind = e.kind(), "{}", e);
                    return Outcome::Failed(e);
                }
            };

        let outcome = match self.run(request, &mut workspace) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(stage = %Stage::Failed, kind = e.kind(), "{}", e);
                Outcome::Failed(e)
            }
        };

        workspace.cleanup();
        debug!(stage = %Stage::Cleaned, "Workspace removed");
        outcome
    }

    fn run(&self, request: &SeparationRequest, workspace: &mut RequestWorkspace) -> Result<Outcome> {
        // Fail before the expensive part if remote delivery cannot work
        if request.delivery == DeliveryMode::Remote {
            self.storage.store()?;
        }

        let extension = audio::sniff_extension(&request.audio);
        if extension.is_none() {
            debug!("Unrecognized container, letting the decoder detect it");
        }
        let input = workspace.stage_input(&request.audio, extension)?.to_path_buf();

        let stems = self.separator.separate(&input, request.stems)?;
        info!(stage = %Stage::Separated, "Separated {} stems", stems.len());

        let mut builder = ArchiveBuilder::create(workspace.archive_path())?;
        for stem in stems {
            let (name, bytes) = self.render_stem(&stem, request)?;
            fs::write(workspace.stems_dir().join(&name), &bytes)?;
            builder.add_entry(&name, &bytes)?;
        }
        let (archive, manifest) = builder.finalize()?;
        let size_bytes = archive.len() as u64;
        info!(
            stage = %Stage::Archived,
            entries = manifest.len(),
            "Archive is {:.2} MB",
            size_bytes as f64 / (1024.0 * 1024.0)
        );

        let policy = SizePolicy::new(self.settings.size_limit(request.delivery));
        if let GateDecision::Rejected(rejection) = policy.check(size_bytes, request) {
            warn!(
                "Archive {:.2} MB exceeds the {:.2} MB {} limit",
                rejection.actual_mb, rejection.limit_mb, request.delivery
            );
            return Ok(Outcome::Rejected(Rejected {
                rejection,
                manifest,
                delivery: request.delivery,
            }));
        }
        debug!(stage = %Stage::SizeChecked, "Archive within {} bytes", policy.limit_bytes());

        let delivery = match request.delivery {
            DeliveryMode::Inline => delivery::deliver_inline(&archive),
            DeliveryMode::Remote => delivery::deliver_remote(
                self.storage.store()?,
                archive,
                &self.settings.key_prefix,
                &request.id,
                request.expire_hours,
            )?,
        };
        info!(stage = %Stage::Delivered, "Delivered {}", request.delivery);

        Ok(Outcome::Delivered(Delivered {
            delivery,
            manifest,
            size_bytes,
            format: request.format,
            bitrate: request.bitrate,
            stems: request.stems,
        }))
    }

    /// Render one stem to its archive entry, falling back to WAV if compression fails
    fn render_stem(&self, stem: &Stem, request: &SeparationRequest) -> Result<(String, Vec<u8>)> {
        let wav = audio::encode_wav(&stem.audio)?;
        let wav_name = format!("{}.{}", stem.name, OutputFormat::Wav.extension());

        if !request.format.is_compressed() {
            return Ok((wav_name, wav));
        }

        match audio::compress(
            self.transcoder.as_ref(),
            stem.name.as_str(),
            &stem.audio,
            wav.len(),
            request.bitrate,
        ) {
            Ok(compressed) => Ok((
                format!("{}.{}", stem.name, request.format.extension()),
                compressed.bytes,
            )),
            Err(e) => {
                warn!(
                    kind = "TranscodeError",
                    stem = stem.name.as_str(),
                    "Keeping WAV for {}: {}",
                    stem.name,
                    e
                );
                Ok((wav_name, wav))
            }
        }
    }
}
