//! Pairwise face verification.
//!
//! [`Verifier`] is the seam between the HTTP layer and the recognition
//! pipeline: two image paths in, one [`VerificationResult`] out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{DistanceMetric, Embedding, VerificationResult};
use image::{ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model identifier served by [`OnnxVerifier`].
pub const ARCFACE_MODEL_NAME: &str = "ArcFace";

const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("unsupported model: {0} (available: {ARCFACE_MODEL_NAME})")]
    UnsupportedModel(String),
    #[error("cannot read image {path}: {message}")]
    ImageLoad { path: PathBuf, message: String },
    #[error("face could not be detected in {0}; set enforce_detection to false to use the whole image")]
    NoFaceDetected(PathBuf),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Decides whether two images show the same person.
///
/// Implementations own inference state and need exclusive access per call.
pub trait Verifier: Send {
    fn verify(
        &mut self,
        img1: &Path,
        img2: &Path,
        model_name: &str,
        enforce_detection: bool,
    ) -> Result<VerificationResult, VerifyError>;
}

/// SCRFD + ArcFace verifier running on ONNX Runtime.
pub struct OnnxVerifier {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    metric: DistanceMetric,
    threshold: f32,
}

impl OnnxVerifier {
    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    ///
    /// `threshold` defaults to the metric's ArcFace cutoff.
    pub fn load(
        model_dir: &Path,
        metric: DistanceMetric,
        threshold: Option<f32>,
    ) -> Result<Self, VerifyError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        let threshold = threshold.unwrap_or_else(|| metric.default_threshold());

        tracing::info!(%metric, threshold, "verifier ready");

        Ok(Self {
            detector,
            recognizer,
            metric,
            threshold,
        })
    }

    /// Detected faces for a single image file, most confident first.
    pub fn detect(&mut self, path: &Path) -> Result<Vec<crate::BoundingBox>, VerifyError> {
        let image = load_rgb(path)?;
        Ok(self.detector.detect(&image)?)
    }

    fn represent(&mut self, path: &Path, enforce_detection: bool) -> Result<Embedding, VerifyError> {
        let image = load_rgb(path)?;
        let faces = self.detector.detect(&image)?;

        match faces.first() {
            Some(face) => {
                tracing::debug!(
                    path = %path.display(),
                    confidence = face.confidence,
                    faces = faces.len(),
                    "using most confident face"
                );
                Ok(self.recognizer.extract(&image, face)?)
            }
            None if enforce_detection => Err(VerifyError::NoFaceDetected(path.to_path_buf())),
            None => {
                tracing::debug!(path = %path.display(), "no face detected; embedding whole image");
                Ok(self.recognizer.extract_unaligned(&image)?)
            }
        }
    }
}

impl Verifier for OnnxVerifier {
    fn verify(
        &mut self,
        img1: &Path,
        img2: &Path,
        model_name: &str,
        enforce_detection: bool,
    ) -> Result<VerificationResult, VerifyError> {
        if model_name != ARCFACE_MODEL_NAME {
            return Err(VerifyError::UnsupportedModel(model_name.to_string()));
        }

        let a = self.represent(img1, enforce_detection)?;
        let b = self.represent(img2, enforce_detection)?;
        let distance = self.metric.distance(&a, &b);

        Ok(VerificationResult::decide(distance, self.threshold, ARCFACE_MODEL_NAME))
    }
}

/// Decode an image file into RGB, sniffing the format from its contents.
///
/// The extension is not trusted: uploaded PNGs land in `.jpg` temp files.
pub fn load_rgb(path: &Path) -> Result<RgbImage, VerifyError> {
    let load_err = |message: String| VerifyError::ImageLoad {
        path: path.to_path_buf(),
        message,
    };

    let image = ImageReader::open(path)
        .map_err(|e| load_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| load_err(e.to_string()))?
        .decode()
        .map_err(|e| load_err(e.to_string()))?;

    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    #[test]
    fn test_load_rgb_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actually-a-png.jpg");
        RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let img = load_rgb(&path).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_load_rgb_missing_file() {
        let err = load_rgb(Path::new("/nonexistent/path.jpg")).unwrap_err();
        assert!(matches!(err, VerifyError::ImageLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/path.jpg"));
    }

    #[test]
    fn test_load_rgb_garbage_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.jpg");
        std::fs::write(&path, b"not an image at all").unwrap();
        assert!(matches!(load_rgb(&path), Err(VerifyError::ImageLoad { .. })));
    }

    #[test]
    fn test_load_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxVerifier::load(dir.path(), DistanceMetric::Cosine, None).err();
        assert!(matches!(
            err,
            Some(VerifyError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }
}
