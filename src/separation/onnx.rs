//! ONNX Runtime based separation backend
//!
//! Model contract: input waveform `[1, 2, samples]` at 44.1 kHz, output
//! `[1, stems, 2, samples]` with stems in [`StemCount::stem_names`] order.

use super::chunking::ChunkConfig;
use super::model::find_model_path;
use super::traits::{ModelLoader, StemModel};
use crate::audio::STEM_SAMPLE_RATE;
use crate::error::{Result, StemsplitError};
use crate::types::StemCount;
use std::path::PathBuf;
use tracing::debug;

#[cfg(feature = "onnx")]
use super::chunking::{chunk_audio, overlap_add, StemChunk};
#[cfg(feature = "onnx")]
use crate::types::StereoBuffer;
#[cfg(feature = "onnx")]
use ort::session::Session;
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use std::sync::Mutex;
#[cfg(feature = "onnx")]
use tracing::info;

/// Whether this build can run ONNX models (`--features onnx`)
pub const ONNX_AVAILABLE: bool = cfg!(feature = "onnx");

/// Loads `spleeter-{n}stems.onnx` models through ONNX Runtime
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    model_dir: Option<PathBuf>,
    model_url: Option<String>,
    chunk: ChunkConfig,
}

impl OnnxModelLoader {
    pub fn new(model_dir: Option<PathBuf>, model_url: Option<String>, segment_seconds: f32) -> Self {
        Self {
            model_dir,
            model_url,
            chunk: ChunkConfig::with_segment(segment_seconds, STEM_SAMPLE_RATE),
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    #[cfg(feature = "onnx")]
    fn load(&self, stems: StemCount) -> Result<Box<dyn StemModel>> {
        let model_path =
            find_model_path(self.model_dir.as_deref(), self.model_url.as_deref(), stems)?;
        let session = create_session(&model_path, stems)?;

        info!(
            "ONNX session ready for {}: {}",
            stems,
            model_path.display()
        );

        Ok(Box::new(OnnxStemModel {
            name: format!("spleeter:{}", stems),
            stems,
            session: Mutex::new(session),
            chunk: self.chunk.clone(),
        }))
    }

    #[cfg(not(feature = "onnx"))]
    fn load(&self, stems: StemCount) -> Result<Box<dyn StemModel>> {
        // Still resolve the path so a misconfigured model dir is reported first
        let model_path =
            find_model_path(self.model_dir.as_deref(), self.model_url.as_deref(), stems)?;
        debug!(
            "Found {} but ONNX support is not compiled in (chunk {} samples)",
            model_path.display(),
            self.chunk.chunk_samples
        );
        Err(StemsplitError::model_load(
            stems.count(),
            "Built without the 'onnx' feature. Rebuild with --features onnx",
        ))
    }
}

/// Create an ORT session on the CPU execution provider
#[cfg(feature = "onnx")]
fn create_session(model_path: &Path, stems: StemCount) -> Result<Session> {
    use ort::execution_providers::CPUExecutionProvider;

    let fail = |what: &str, e: ort::Error| {
        StemsplitError::model_load(stems.count(), format!("{}: {}", what, e))
    };

    Session::builder()
        .map_err(|e| fail("Failed to create ORT session builder", e))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| fail("Failed to configure CPU provider", e))?
        .commit_from_file(model_path)
        .map_err(|e| fail("Failed to load model", e))
}

/// A loaded ONNX separation model
#[cfg(feature = "onnx")]
pub struct OnnxStemModel {
    name: String,
    stems: StemCount,
    /// ORT session (wrapped in Mutex for interior mutability)
    session: Mutex<Session>,
    chunk: ChunkConfig,
}

#[cfg(feature = "onnx")]
impl StemModel for OnnxStemModel {
    fn separate(&self, audio: &StereoBuffer) -> Result<Vec<StereoBuffer>> {
        let num_stems = self.stems.count() as usize;
        let chunks = chunk_audio(audio, &self.chunk);
        debug!("Processing {} chunks...", chunks.len());

        let mut stem_chunks = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            debug!("Processing chunk {}/{}", chunk.index + 1, chunks.len());
            stem_chunks.push(StemChunk {
                index: chunk.index,
                start_sample: chunk.start_sample,
                stems: self.run_chunk(&chunk.audio, num_stems)?,
            });
        }

        overlap_add(&stem_chunks, &self.chunk, num_stems, audio.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "onnx")]
impl OnnxStemModel {
    /// Run inference on one chunk
    fn run_chunk(&self, audio: &StereoBuffer, num_stems: usize) -> Result<Vec<StereoBuffer>> {
        use ndarray::Array3;
        use ort::value::Tensor;

        let mut session = self
            .session
            .lock()
            .map_err(|_| StemsplitError::separation("Failed to acquire session lock"))?;

        // Input tensor: shape (batch=1, channels=2, samples)
        let chunk_len = audio.len();
        let mut input_data = Array3::<f32>::zeros((1, 2, chunk_len));
        input_data
            .slice_mut(ndarray::s![0, 0, ..])
            .assign(&ndarray::ArrayView1::from(&audio.left[..chunk_len]));
        input_data
            .slice_mut(ndarray::s![0, 1, ..])
            .assign(&ndarray::ArrayView1::from(&audio.right[..chunk_len]));

        let input_tensor = Tensor::from_array(input_data).map_err(|e| {
            StemsplitError::separation(format!("Failed to create input tensor: {}", e))
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| StemsplitError::separation("Model has no input tensors defined"))?;

        let outputs = session
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| StemsplitError::separation(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .map(|(_, v)| v)
            .ok_or_else(|| StemsplitError::separation("No output tensor from model"))?;

        let (output_shape, output_data) = output.try_extract_tensor::<f32>().map_err(|e| {
            StemsplitError::separation(format!("Failed to extract output tensor: {}", e))
        })?;

        let shape: Vec<i64> = output_shape.iter().copied().collect();
        let expected = [1, num_stems as i64, 2];
        if shape.len() != 4 || shape[..3] != expected || shape[3] < 0 {
            return Err(StemsplitError::separation(format!(
                "Expected output shape [1, {}, 2, samples], got {:?}",
                num_stems, shape
            )));
        }

        let output_samples = shape[3] as usize;
        let expected_len = num_stems
            .checked_mul(2)
            .and_then(|v| v.checked_mul(output_samples))
            .ok_or_else(|| {
                StemsplitError::separation(format!("Output shape {:?} overflows", shape))
            })?;

        if output_data.len() != expected_len {
            return Err(StemsplitError::separation(format!(
                "Output buffer length {} doesn't match shape {:?}",
                output_data.len(),
                shape
            )));
        }

        // Row-major [stems, channels, samples]; trim or pad to the chunk length
        let take = output_samples.min(chunk_len);
        let channel = |stem: usize, ch: usize| -> Vec<f32> {
            let start = (stem * 2 + ch) * output_samples;
            let mut samples = output_data[start..start + take].to_vec();
            samples.resize(chunk_len, 0.0);
            samples
        };

        Ok((0..num_stems)
            .map(|stem| StereoBuffer::new(channel(stem, 0), channel(stem, 1), audio.sample_rate))
            .collect())
    }
}
