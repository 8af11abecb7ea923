//! Core data types for stemsplit
//!
//! These types represent the domain model and flow through the pipeline.

use serde::{Deserialize, Serialize};

// =============================================================================
// Request vocabulary
// =============================================================================

/// Number of stems a separation model produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StemCount {
    Two,
    Four,
    Five,
}

impl StemCount {
    /// All supported stem counts
    pub const ALL: [StemCount; 3] = [StemCount::Two, StemCount::Four, StemCount::Five];

    /// Parse from a numeric count; only 2, 4 and 5 are supported
    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            2 => Some(StemCount::Two),
            4 => Some(StemCount::Four),
            5 => Some(StemCount::Five),
            _ => None,
        }
    }

    pub fn count(self) -> u8 {
        match self {
            StemCount::Two => 2,
            StemCount::Four => 4,
            StemCount::Five => 5,
        }
    }

    /// Stem names in the order the model emits them
    pub fn stem_names(self) -> &'static [StemName] {
        match self {
            StemCount::Two => &[StemName::Vocals, StemName::Accompaniment],
            StemCount::Four => &[
                StemName::Vocals,
                StemName::Drums,
                StemName::Bass,
                StemName::Other,
            ],
            StemCount::Five => &[
                StemName::Vocals,
                StemName::Drums,
                StemName::Bass,
                StemName::Piano,
                StemName::Other,
            ],
        }
    }
}

impl std::fmt::Display for StemCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}stems", self.count())
    }
}

/// One isolated component of a music mixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemName {
    Vocals,
    Accompaniment,
    Drums,
    Bass,
    Piano,
    Other,
}

impl StemName {
    pub fn as_str(self) -> &'static str {
        match self {
            StemName::Vocals => "vocals",
            StemName::Accompaniment => "accompaniment",
            StemName::Drums => "drums",
            StemName::Bass => "bass",
            StemName::Piano => "piano",
            StemName::Other => "other",
        }
    }
}

impl std::fmt::Display for StemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output file format for stems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless 16-bit PCM WAV
    Wav,
    /// Compressed MP3 at the requested bitrate
    Mp3,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wav" => Some(OutputFormat::Wav),
            "mp3" => Some(OutputFormat::Mp3),
            _ => None,
        }
    }

    /// File extension (also the wire name)
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, OutputFormat::Mp3)
    }
}

/// Constant bitrate for compressed output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bitrate {
    Kbps128,
    Kbps160,
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Bitrate {
    pub const ALL: [Bitrate; 5] = [
        Bitrate::Kbps128,
        Bitrate::Kbps160,
        Bitrate::Kbps192,
        Bitrate::Kbps256,
        Bitrate::Kbps320,
    ];

    /// Parse the wire form ("192k")
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps128 => 128,
            Bitrate::Kbps160 => 160,
            Bitrate::Kbps192 => 192,
            Bitrate::Kbps256 => 256,
            Bitrate::Kbps320 => 320,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bitrate::Kbps128 => "128k",
            Bitrate::Kbps160 => "160k",
            Bitrate::Kbps192 => "192k",
            Bitrate::Kbps256 => "256k",
            Bitrate::Kbps320 => "320k",
        }
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate::Kbps192
    }
}

/// How the finished archive reaches the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Base64 archive in the response body
    Inline,
    /// Upload to object storage, answer with a signed URL
    Remote,
}

impl DeliveryMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inline" => Some(DeliveryMode::Inline),
            "s3" | "remote" => Some(DeliveryMode::Remote),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Inline => f.write_str("inline"),
            DeliveryMode::Remote => f.write_str("s3"),
        }
    }
}

// =============================================================================
// Audio buffer types
// =============================================================================

/// Stereo audio buffer at full fidelity
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    /// Left channel samples normalized to [-1.0, 1.0]
    pub left: Vec<f32>,
    /// Right channel samples normalized to [-1.0, 1.0]
    pub right: Vec<f32>,
    /// Sample rate in Hz (typically 44100)
    pub sample_rate: u32,
    /// Duration in seconds
    pub duration: f64,
}

impl StereoBuffer {
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        let num_samples = left.len().min(right.len());
        // Guard against division by zero - use 0 duration for invalid sample rate
        let duration = if sample_rate > 0 {
            num_samples as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            left,
            right,
            sample_rate,
            duration,
        }
    }

    /// Number of samples per channel
    pub fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create from interleaved samples
    pub fn from_interleaved(samples: &[f32], sample_rate: u32) -> Self {
        let num_frames = samples.len() / 2;
        let mut left = Vec::with_capacity(num_frames);
        let mut right = Vec::with_capacity(num_frames);

        for chunk in samples.chunks_exact(2) {
            left.push(chunk[0]);
            right.push(chunk[1]);
        }

        Self::new(left, right, sample_rate)
    }

    /// Copy of this buffer with every sample multiplied by `gain`
    pub fn scaled(&self, gain: f32) -> Self {
        Self::new(
            self.left.iter().map(|s| s * gain).collect(),
            self.right.iter().map(|s| s * gain).collect(),
            self.sample_rate,
        )
    }
}

// =============================================================================
// Separation output
// =============================================================================

/// A single separated stem
#[derive(Debug, Clone)]
pub struct Stem {
    pub name: StemName,
    pub audio: StereoBuffer,
}

/// All stems produced for one request, in model order
#[derive(Debug, Clone)]
pub struct StemSet {
    stems: Vec<Stem>,
}

impl StemSet {
    /// Pair model output buffers with the stem names for `count`
    ///
    /// Returns `None` if the number of buffers does not match the count.
    pub fn from_model_output(count: StemCount, buffers: Vec<StereoBuffer>) -> Option<Self> {
        let names = count.stem_names();
        if names.len() != buffers.len() {
            return None;
        }
        let stems = names
            .iter()
            .zip(buffers)
            .map(|(&name, audio)| Stem { name, audio })
            .collect();
        Some(Self { stems })
    }

    pub fn get(&self, name: StemName) -> Option<&StereoBuffer> {
        self.stems.iter().find(|s| s.name == name).map(|s| &s.audio)
    }

    pub fn names(&self) -> Vec<StemName> {
        self.stems.iter().map(|s| s.name).collect()
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stem> {
        self.stems.iter()
    }
}

impl IntoIterator for StemSet {
    type Item = Stem;
    type IntoIter = std::vec::IntoIter<Stem>;

    fn into_iter(self) -> Self::IntoIter {
        self.stems.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_count_parsing() {
        assert_eq!(StemCount::from_count(2), Some(StemCount::Two));
        assert_eq!(StemCount::from_count(4), Some(StemCount::Four));
        assert_eq!(StemCount::from_count(5), Some(StemCount::Five));
        for bad in [-1, 0, 1, 3, 6, 10] {
            assert_eq!(StemCount::from_count(bad), None, "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_stem_names_match_count() {
        for count in StemCount::ALL {
            assert_eq!(count.stem_names().len(), count.count() as usize);
        }
        let two: Vec<_> = StemCount::Two.stem_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(two, ["vocals", "accompaniment"]);
        let five: Vec<_> = StemCount::Five.stem_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(five, ["vocals", "drums", "bass", "piano", "other"]);
    }

    #[test]
    fn test_bitrate_parse() {
        assert_eq!(Bitrate::parse("128k"), Some(Bitrate::Kbps128));
        assert_eq!(Bitrate::parse("320K"), Some(Bitrate::Kbps320));
        assert_eq!(Bitrate::parse("192"), None);
        assert_eq!(Bitrate::parse("64k"), None);
        assert_eq!(Bitrate::default().as_str(), "192k");
    }

    #[test]
    fn test_delivery_mode_aliases() {
        assert_eq!(DeliveryMode::parse("s3"), Some(DeliveryMode::Remote));
        assert_eq!(DeliveryMode::parse("remote"), Some(DeliveryMode::Remote));
        assert_eq!(DeliveryMode::parse("INLINE"), Some(DeliveryMode::Inline));
        assert_eq!(DeliveryMode::parse("ftp"), None);
    }

    #[test]
    fn test_from_interleaved() {
        let buf = StereoBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5], 44100);
        assert_eq!(buf.left, vec![0.1, 0.3]);
        assert_eq!(buf.right, vec![0.2, 0.4]);
    }

    #[test]
    fn test_stem_set_rejects_wrong_buffer_count() {
        let buf = StereoBuffer::new(vec![0.0; 4], vec![0.0; 4], 44100);
        assert!(StemSet::from_model_output(StemCount::Four, vec![buf.clone(); 3]).is_none());
        let set = StemSet::from_model_output(StemCount::Four, vec![buf; 4]).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.get(StemName::Drums).is_some());
        assert!(set.get(StemName::Piano).is_none());
    }
}
