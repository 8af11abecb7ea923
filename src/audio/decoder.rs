//! Audio decoding using symphonia
//!
//! Decodes staged input files to 44.1 kHz stereo f32 for the separation model.
//! Uses rubato for high-quality resampling with proper anti-aliasing.

use crate::error::{Result, StemsplitError};
use crate::types::StereoBuffer;
use rubato::{FftFixedInOut, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Sample rate the separation models expect (44100 Hz)
pub const STEM_SAMPLE_RATE: u32 = 44100;

/// Guess a file extension from the first bytes of an encoded file
///
/// Used as the decoder hint when staging request audio. Returns `None`
/// when the container is not recognised; format detection then runs unhinted.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        Some("wav")
    } else if bytes.starts_with(b"fLaC") {
        Some("flac")
    } else if bytes.starts_with(b"OggS") {
        Some("ogg")
    } else if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 && bytes[1] & 0x06 != 0) {
        Some("mp3")
    } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        Some("m4a")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"FORM" && (&bytes[8..12] == b"AIFF" || &bytes[8..12] == b"AIFC") {
        Some("aiff")
    } else {
        None
    }
}

/// Decode an audio file to stereo at full fidelity for stem separation
///
/// Mono input is duplicated to both channels, multi-channel input is
/// reduced to its front pair, and everything is resampled to 44.1 kHz.
pub fn decode_stereo(path: &Path) -> Result<StereoBuffer> {
    let file = std::fs::File::open(path)
        .map_err(|e| StemsplitError::separation(format!("Failed to open staged input: {}", e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Provide a hint based on file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    // Probe the media source
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| StemsplitError::separation(format!("Failed to detect format: {}", e)))?;

    let mut format = probed.format;

    // Find the first audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| StemsplitError::separation("No audio tracks found"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let source_sample_rate = codec_params.sample_rate.unwrap_or(STEM_SAMPLE_RATE);
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    debug!(
        "Decoding stereo: {} @ {}Hz, {} channels",
        path.display(),
        source_sample_rate,
        channels
    );

    // Create decoder
    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| StemsplitError::separation(format!("Failed to create decoder: {}", e)))?;

    // Collect all interleaved samples
    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // End of stream
            }
            Err(e) => {
                return Err(StemsplitError::separation(format!(
                    "Failed to read packet: {}",
                    e
                )));
            }
        };

        // Skip packets from other tracks
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                // Skip corrupted frames
                trace!("Skipping corrupted frame: {}", e);
                continue;
            }
            Err(e) => {
                return Err(StemsplitError::separation(format!("Decode error: {}", e)));
            }
        };

        // Some containers only report the channel layout on the first frame
        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        all_samples.extend(sample_buf.samples());
    }

    if all_samples.is_empty() || channels == 0 {
        return Err(StemsplitError::separation("Input contains no audio samples"));
    }

    let stereo = match channels {
        1 => StereoBuffer::new(all_samples.clone(), all_samples, source_sample_rate),
        2 => StereoBuffer::from_interleaved(&all_samples, source_sample_rate),
        _ => {
            let stereo_samples = downmix_to_stereo(&all_samples, channels);
            StereoBuffer::from_interleaved(&stereo_samples, source_sample_rate)
        }
    };

    let final_stereo = resample_to(stereo, STEM_SAMPLE_RATE)?;

    debug!(
        "Decoded stereo {} samples ({:.2}s)",
        final_stereo.len(),
        final_stereo.duration
    );

    Ok(final_stereo)
}

/// Downmix multi-channel audio to stereo by keeping the front pair
fn downmix_to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 2 {
        return samples.to_vec();
    }

    let num_frames = samples.len() / channels;
    let mut stereo = Vec::with_capacity(num_frames * 2);

    // For 5.1 surround: FL, FR, FC, LFE, BL, BR
    for frame in samples.chunks_exact(channels) {
        stereo.push(frame[0]);
        stereo.push(frame[1]);
    }

    stereo
}

/// Input frames per resampler block
const RESAMPLE_CHUNK: usize = 1024;

/// Resample stereo audio to `to_rate` with rubato
///
/// Both channels run through one resampler so they stay aligned. The
/// resampler delay is trimmed and the output holds exactly
/// `len * to_rate / from_rate` frames.
fn resample_to(audio: StereoBuffer, to_rate: u32) -> Result<StereoBuffer> {
    let from_rate = audio.sample_rate;
    if from_rate == to_rate || audio.is_empty() {
        return Ok(audio);
    }

    let fail = |e: &dyn std::fmt::Display| {
        StemsplitError::separation(format!(
            "Resampling {} Hz -> {} Hz failed: {}",
            from_rate, to_rate, e
        ))
    };

    let mut resampler =
        FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2)
            .map_err(|e| fail(&e))?;

    let frames = audio.len();
    let expected = (frames as u64 * to_rate as u64 / from_rate as u64) as usize;
    let delay = resampler.output_delay();
    let block_len = resampler.input_frames_next();

    let mut left = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut right = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    // Zero blocks past the end flush the filter tail
    let mut pos = 0;
    while left.len() < expected + delay {
        let mut block = [vec![0.0f32; block_len], vec![0.0f32; block_len]];
        if pos < frames {
            let end = (pos + block_len).min(frames);
            block[0][..end - pos].copy_from_slice(&audio.left[pos..end]);
            block[1][..end - pos].copy_from_slice(&audio.right[pos..end]);
        }

        let out = resampler.process(&block, None).map_err(|e| fail(&e))?;
        left.extend_from_slice(&out[0]);
        right.extend_from_slice(&out[1]);
        pos += block_len;
    }

    left.drain(..delay);
    right.drain(..delay);
    left.truncate(expected);
    right.truncate(expected);

    trace!(
        "Resampled {} frames at {} Hz to {} frames at {} Hz",
        frames,
        from_rate,
        expected,
        to_rate
    );

    Ok(StereoBuffer::new(left, right, to_rate))
}
