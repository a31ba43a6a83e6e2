//! faceverify-core — Face detection, recognition and pairwise verification.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod types;
pub mod verifier;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, DistanceMetric, Embedding, VerificationResult};
pub use verifier::{OnnxVerifier, Verifier, VerifyError, ARCFACE_MODEL_NAME};

/// Default ONNX model directory: `$XDG_DATA_HOME/faceverify/models`,
/// falling back to `$HOME/.local/share/faceverify/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceverify/models")
}
