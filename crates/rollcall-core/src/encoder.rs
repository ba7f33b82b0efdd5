//! Image → face embeddings.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceEncoding;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds every face in an image and produces one embedding per face.
///
/// Implementations are CPU-bound and may be stateful, hence `&mut self`.
/// Each frame worker owns its own encoder.
pub trait FaceEncoder: Send {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncoderError>;
}

/// SCRFD detection followed by ArcFace embedding.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(scrfd_path)?;
        tracing::info!(path = scrfd_path, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

        Ok(Self { detector, recognizer })
    }

    /// Load both models from their standard file names inside `model_dir`.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, EncoderError> {
        let scrfd = model_dir.join(SCRFD_MODEL_FILE);
        let arcface = model_dir.join(ARCFACE_MODEL_FILE);
        Self::load(&scrfd.to_string_lossy(), &arcface.to_string_lossy())
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncoderError> {
        let faces = self.detector.detect(image)?;
        tracing::trace!(faces = faces.len(), "detected faces");

        let mut encodings = Vec::with_capacity(faces.len());
        for face in faces {
            if face.landmarks.is_none() {
                tracing::debug!(confidence = face.confidence, "face without landmarks; skipping");
                continue;
            }
            let embedding = self.recognizer.extract(image, &face)?;
            encodings.push(FaceEncoding { face, embedding });
        }
        Ok(encodings)
    }
}
