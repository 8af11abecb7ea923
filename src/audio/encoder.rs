//! Lossless stem rendering

use crate::error::{Result, StemsplitError};
use crate::types::StereoBuffer;
use std::io::Cursor;

/// Convert a normalized f32 sample to 16-bit PCM
pub(crate) fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode stereo audio as a 16-bit PCM WAV file in memory
pub fn encode_wav(audio: &StereoBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut output = Vec::with_capacity(44 + audio.len() * 4);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut output), spec)
            .map_err(|e| StemsplitError::archive(format!("Failed to create WAV writer: {}", e)))?;

        for (l, r) in audio.left.iter().zip(audio.right.iter()) {
            writer
                .write_sample(to_i16(*l))
                .and_then(|_| writer.write_sample(to_i16(*r)))
                .map_err(|e| StemsplitError::archive(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| StemsplitError::archive(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(output)
}
