//! Audio decoding, lossless rendering and transcoding

pub mod decoder;
pub mod encoder;
pub mod transcode;

pub use decoder::{decode_stereo, sniff_extension, STEM_SAMPLE_RATE};
pub use encoder::encode_wav;
pub use transcode::{compress, Compressed, LameTranscoder, Transcoder};
