//! Compressed stem rendering
//!
//! Transcoding is best-effort: a failure is returned as a [`TranscodeError`]
//! value and the caller keeps the lossless rendition of that stem.

use crate::error::TranscodeError;
use crate::types::{Bitrate, StereoBuffer};
use tracing::{debug, info};

/// Lossless-to-compressed audio encoder
pub trait Transcoder: Send + Sync {
    /// Encode stereo audio at a constant bitrate
    fn transcode(
        &self,
        audio: &StereoBuffer,
        bitrate: Bitrate,
    ) -> std::result::Result<Vec<u8>, TranscodeError>;

    /// Get the name of this transcoder (for logging)
    fn name(&self) -> &'static str;
}

/// A successfully compressed stem with its size delta
#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
}

impl Compressed {
    /// Compressed size as a fraction of the original
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }
}

/// Run a transcoder and report the original/compressed size delta
///
/// `original_size` is the byte length of the lossless rendition the
/// compressed output replaces.
pub fn compress(
    transcoder: &dyn Transcoder,
    label: &str,
    audio: &StereoBuffer,
    original_size: usize,
    bitrate: Bitrate,
) -> std::result::Result<Compressed, TranscodeError> {
    if audio.is_empty() {
        return Err(TranscodeError::EmptyInput);
    }

    debug!(
        "Transcoding {} with {} at {}",
        label,
        transcoder.name(),
        bitrate.as_str()
    );
    let bytes = transcoder.transcode(audio, bitrate)?;
    let compressed = Compressed {
        compressed_size: bytes.len(),
        bytes,
        original_size,
    };

    info!(
        stem = label,
        original_bytes = compressed.original_size,
        compressed_bytes = compressed.compressed_size,
        "Compressed {}: {:.2} MB -> {:.2} MB ({:.0}%)",
        label,
        compressed.original_size as f64 / (1024.0 * 1024.0),
        compressed.compressed_size as f64 / (1024.0 * 1024.0),
        compressed.ratio() * 100.0
    );

    Ok(compressed)
}

/// MP3 transcoder using LAME via the mp3lame-encoder crate
#[derive(Debug, Default, Clone, Copy)]
pub struct LameTranscoder;

impl LameTranscoder {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "mp3")]
impl LameTranscoder {
    fn lame_bitrate(bitrate: Bitrate) -> mp3lame_encoder::Bitrate {
        match bitrate {
            Bitrate::Kbps128 => mp3lame_encoder::Bitrate::Kbps128,
            Bitrate::Kbps160 => mp3lame_encoder::Bitrate::Kbps160,
            Bitrate::Kbps192 => mp3lame_encoder::Bitrate::Kbps192,
            Bitrate::Kbps256 => mp3lame_encoder::Bitrate::Kbps256,
            Bitrate::Kbps320 => mp3lame_encoder::Bitrate::Kbps320,
        }
    }
}

impl Transcoder for LameTranscoder {
    #[cfg(feature = "mp3")]
    fn transcode(
        &self,
        audio: &StereoBuffer,
        bitrate: Bitrate,
    ) -> std::result::Result<Vec<u8>, TranscodeError> {
        use super::encoder::to_i16;
        use mp3lame_encoder::{Builder, DualPcm, FlushNoGap};

        let mut builder = Builder::new()
            .ok_or_else(|| TranscodeError::Setup("LAME encoder init failed".to_string()))?;
        builder
            .set_num_channels(2)
            .map_err(|e| TranscodeError::Setup(format!("set channels: {:?}", e)))?;
        builder
            .set_sample_rate(audio.sample_rate)
            .map_err(|e| TranscodeError::Setup(format!("set sample rate: {:?}", e)))?;
        builder
            .set_brate(Self::lame_bitrate(bitrate))
            .map_err(|e| TranscodeError::Setup(format!("set bitrate: {:?}", e)))?;
        builder
            .set_quality(mp3lame_encoder::Quality::Best)
            .map_err(|e| TranscodeError::Setup(format!("set quality: {:?}", e)))?;
        let mut encoder = builder
            .build()
            .map_err(|e| TranscodeError::Setup(format!("build: {:?}", e)))?;

        let left: Vec<i16> = audio.left.iter().map(|s| to_i16(*s)).collect();
        let right: Vec<i16> = audio.right.iter().map(|s| to_i16(*s)).collect();
        let frames = left.len().min(right.len());

        let mut mp3_out =
            Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(frames));
        let input = DualPcm {
            left: &left[..frames],
            right: &right[..frames],
        };
        let encoded = encoder
            .encode(input, mp3_out.spare_capacity_mut())
            .map_err(|e| TranscodeError::Encode(format!("{:?}", e)))?;
        // SAFETY: the encoder initialised `encoded` bytes of spare capacity
        unsafe {
            mp3_out.set_len(mp3_out.len().wrapping_add(encoded));
        }

        // LAME needs at most 7200 bytes to flush its internal buffers
        mp3_out.reserve(7200);
        let flushed = encoder
            .flush::<FlushNoGap>(mp3_out.spare_capacity_mut())
            .map_err(|e| TranscodeError::Encode(format!("flush: {:?}", e)))?;
        // SAFETY: the encoder initialised `flushed` bytes of spare capacity
        unsafe {
            mp3_out.set_len(mp3_out.len().wrapping_add(flushed));
        }

        Ok(mp3_out)
    }

    #[cfg(not(feature = "mp3"))]
    fn transcode(
        &self,
        _audio: &StereoBuffer,
        _bitrate: Bitrate,
    ) -> std::result::Result<Vec<u8>, TranscodeError> {
        Err(TranscodeError::Unavailable)
    }

    fn name(&self) -> &'static str {
        "lame"
    }
}
