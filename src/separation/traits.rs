//! Separation backend abstractions
//!
//! The pretrained model is an opaque collaborator: stereo audio in, one
//! stereo buffer per stem out. These traits let the backend be swapped
//! (ONNX Runtime in production, in-process fakes in tests).

use crate::error::Result;
use crate::types::{StemCount, StereoBuffer};

/// A loaded separation model
pub trait StemModel: Send + Sync {
    /// Separate a mixture into stems
    ///
    /// Returns one buffer per stem, in the order of
    /// [`StemCount::stem_names`], each as long as the input.
    fn separate(&self, audio: &StereoBuffer) -> Result<Vec<StereoBuffer>>;

    /// Get the name of this model (for logging)
    fn name(&self) -> &str;
}

/// Instantiates models; called at most once per stem count per process
pub trait ModelLoader: Send + Sync {
    fn load(&self, stems: StemCount) -> Result<Box<dyn StemModel>>;
}
