//! Stem separation
//!
//! Wraps a pretrained source-separation model behind [`StemModel`] and
//! caches one instance per stem count in a [`SeparationContext`].
//!
//! The production backend needs the `onnx` cargo feature. Deployments must
//! build with `cargo build --release --features onnx`; without it every
//! model load fails with `ModelLoadError`.

pub mod chunking;
pub mod context;
pub mod model;
pub mod onnx;
pub mod traits;

pub use context::SeparationContext;
pub use onnx::{OnnxModelLoader, ONNX_AVAILABLE};
pub use traits::{ModelLoader, StemModel};
