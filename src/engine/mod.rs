//! Inference engine module
//!
//! OpenVINO-backed face detection and ArcFace embedding, plus the image
//! preprocessing both need.

pub mod runtime;
pub mod detector;
pub mod embedder;
pub mod preprocess;

pub use runtime::InferenceRuntime;
pub use detector::{FaceBox, FaceDetection, FaceDetector};
pub use embedder::ArcFaceEmbedder;
