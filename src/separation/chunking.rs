//! Audio chunking with overlap-add for stem separation
//!
//! Separation models work on bounded segments. Long inputs are split into
//! overlapping chunks, separated one by one, and the per-stem outputs are
//! reassembled with a linear crossfade over the overlap.

use crate::error::{Result, StemsplitError};
use crate::types::StereoBuffer;

/// Overlap between segments in seconds (for smooth crossfade)
pub const OVERLAP_SECONDS: f32 = 1.0;

/// Configuration for audio chunking
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum samples per chunk
    pub chunk_samples: usize,
    /// Overlap samples between chunks
    pub overlap_samples: usize,
    /// Sample rate
    pub sample_rate: u32,
}

impl ChunkConfig {
    /// Create config with custom parameters
    pub fn new(max_seconds: f32, overlap_seconds: f32, sample_rate: u32) -> Self {
        Self {
            chunk_samples: (max_seconds * sample_rate as f32) as usize,
            overlap_samples: (overlap_seconds * sample_rate as f32) as usize,
            sample_rate,
        }
    }

    /// Segments of `segment_seconds` with the default one-second overlap
    pub fn with_segment(segment_seconds: f32, sample_rate: u32) -> Self {
        Self::new(segment_seconds, OVERLAP_SECONDS, sample_rate)
    }

    /// Calculate stride (hop) between chunk starts
    pub fn stride(&self) -> usize {
        self.chunk_samples.saturating_sub(self.overlap_samples).max(1)
    }
}

/// A single audio chunk ready for processing
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Chunk index (0-based)
    pub index: usize,
    /// Start sample in original audio
    pub start_sample: usize,
    /// End sample in original audio
    pub end_sample: usize,
    /// Audio data for this chunk
    pub audio: StereoBuffer,
}

/// Separated stems for a single chunk, in model order
#[derive(Debug, Clone)]
pub struct StemChunk {
    pub index: usize,
    pub start_sample: usize,
    pub stems: Vec<StereoBuffer>,
}

/// Split audio into overlapping chunks
pub fn chunk_audio(audio: &StereoBuffer, config: &ChunkConfig) -> Vec<AudioChunk> {
    let total_samples = audio.len();
    let stride = config.stride();

    if total_samples <= config.chunk_samples {
        return vec![AudioChunk {
            index: 0,
            start_sample: 0,
            end_sample: total_samples,
            audio: audio.clone(),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while start < total_samples {
        let end = (start + config.chunk_samples).min(total_samples);

        chunks.push(AudioChunk {
            index,
            start_sample: start,
            end_sample: end,
            audio: StereoBuffer::new(
                audio.left[start..end].to_vec(),
                audio.right[start..end].to_vec(),
                audio.sample_rate,
            ),
        });

        if end == total_samples {
            break;
        }

        start += stride;
        index += 1;
    }

    chunks
}

/// Reassemble separated stem chunks using overlap-add with linear crossfade
///
/// Every chunk must carry `num_stems` buffers.
pub fn overlap_add(
    chunks: &[StemChunk],
    config: &ChunkConfig,
    num_stems: usize,
    total_samples: usize,
) -> Result<Vec<StereoBuffer>> {
    let mut left = vec![vec![0.0f32; total_samples]; num_stems];
    let mut right = vec![vec![0.0f32; total_samples]; num_stems];
    let mut weight_sum = vec![0.0f32; total_samples];

    let last_index = chunks.len().saturating_sub(1);

    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.stems.len() != num_stems {
            return Err(StemsplitError::separation(format!(
                "Chunk {} has {} stems, expected {}",
                chunk.index,
                chunk.stems.len(),
                num_stems
            )));
        }

        let chunk_len = chunk.stems.iter().map(|s| s.len()).min().unwrap_or(0);
        let weights = generate_crossfade_weights(
            chunk_len,
            config.overlap_samples,
            position == 0,
            position == last_index,
        );

        for (stem_idx, stem) in chunk.stems.iter().enumerate() {
            for (i, w) in weights.iter().enumerate() {
                let out_idx = chunk.start_sample + i;
                if out_idx >= total_samples {
                    break;
                }
                left[stem_idx][out_idx] += stem.left[i] * w;
                right[stem_idx][out_idx] += stem.right[i] * w;
            }
        }

        for (i, w) in weights.iter().enumerate() {
            let out_idx = chunk.start_sample + i;
            if out_idx >= total_samples {
                break;
            }
            weight_sum[out_idx] += w;
        }
    }

    // Normalize by weight sum
    for (i, &w) in weight_sum.iter().enumerate() {
        if w > 1e-8 {
            let inv_w = 1.0 / w;
            for stem_idx in 0..num_stems {
                left[stem_idx][i] *= inv_w;
                right[stem_idx][i] *= inv_w;
            }
        }
    }

    Ok(left
        .into_iter()
        .zip(right)
        .map(|(l, r)| StereoBuffer::new(l, r, config.sample_rate))
        .collect())
}

/// Generate crossfade weights for a chunk
///
/// Uses linear ramps at the start and end of each chunk for smooth blending
fn generate_crossfade_weights(
    chunk_len: usize,
    overlap: usize,
    is_first: bool,
    is_last: bool,
) -> Vec<f32> {
    let mut weights = vec![1.0f32; chunk_len];

    // Fade in at start (unless first chunk)
    if !is_first {
        let fade_len = overlap.min(chunk_len);
        for (i, weight) in weights.iter_mut().take(fade_len).enumerate() {
            *weight = i as f32 / fade_len as f32;
        }
    }

    // Fade out at end (unless last chunk)
    if !is_last {
        let fade_len = overlap.min(chunk_len);
        let start = chunk_len.saturating_sub(fade_len);
        for (i, weight) in weights[start..].iter_mut().enumerate() {
            *weight *= (fade_len - i) as f32 / fade_len as f32;
        }
    }

    weights
}
