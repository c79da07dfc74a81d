//! Capability implementations
//!
//! `synthetic` is always available. `native` captures from real cameras via
//! nokhwa (feature `native-camera`); `onnx` runs selfie segmentation through
//! ONNX Runtime (feature `onnx`).

#[cfg(feature = "native-camera")]
pub mod native;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod synthetic;

#[cfg(feature = "native-camera")]
pub use native::NokhwaPlatform;
#[cfg(feature = "onnx")]
pub use onnx::OnnxSegmenter;
pub use synthetic::{SyntheticSegmenter, TestPatternPlatform};
