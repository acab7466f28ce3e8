//! The production [`FaceModel`]: insightface buffalo_l models on ONNX Runtime.

use crate::detector::FaceDetector;
use crate::landmarker::FaceLandmarker;
use crate::model::{FaceModel, ModelError};
use crate::recognizer::FaceRecognizer;
use crate::types::{Encoding, FaceBox, FaceLandmarks};
use image::GrayImage;
use std::path::{Path, PathBuf};

pub const DETECTOR_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_FILE: &str = "w600k_r50.onnx";
pub const LANDMARKER_FILE: &str = "1k3d68.onnx";

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

pub struct OnnxFaceModel {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    landmarker: FaceLandmarker,
}

impl OnnxFaceModel {
    /// Load all three models from `model_dir`. Fails fast if any is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_FILE))?;
        let landmarker = FaceLandmarker::load(&model_dir.join(LANDMARKER_FILE))?;
        Ok(Self {
            detector,
            recognizer,
            landmarker,
        })
    }
}

impl FaceModel for OnnxFaceModel {
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>, ModelError> {
        Ok(self.detector.detect(image)?)
    }

    fn encode(&mut self, image: &GrayImage, boxes: &[FaceBox]) -> Result<Vec<Encoding>, ModelError> {
        boxes
            .iter()
            .map(|b| self.recognizer.extract(image, b).map_err(ModelError::from))
            .collect()
    }

    fn landmarks(
        &mut self,
        image: &GrayImage,
        boxes: &[FaceBox],
    ) -> Result<Vec<FaceLandmarks>, ModelError> {
        boxes
            .iter()
            .map(|b| self.landmarker.landmarks(image, b).map_err(ModelError::from))
            .collect()
    }
}
