//! The face model capability contract.
//!
//! Everything downstream (enrollment, the recognition worker) talks to faces
//! only through [`FaceModel`], so the ONNX implementation can be swapped for a
//! scripted fake in tests.

use crate::types::{Encoding, FaceBox, FaceLandmarks};
use image::GrayImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("detector error: {0}")]
    Detector(#[from] crate::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] crate::recognizer::RecognizerError),
    #[error("landmarker error: {0}")]
    Landmarker(#[from] crate::landmarker::LandmarkError),
}

/// Face analysis capabilities the attendance core depends on.
///
/// `encode` and `landmarks` return one entry per input box, in the same order.
pub trait FaceModel: Send {
    /// Locate faces in an image.
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>, ModelError>;

    /// Extract one encoding per box.
    fn encode(&mut self, image: &GrayImage, boxes: &[FaceBox]) -> Result<Vec<Encoding>, ModelError>;

    /// Extract named landmark sets per box.
    fn landmarks(
        &mut self,
        image: &GrayImage,
        boxes: &[FaceBox],
    ) -> Result<Vec<FaceLandmarks>, ModelError>;

    /// Distance from `probe` to each known encoding, index-aligned with `known`.
    fn distance(&self, known: &[Encoding], probe: &Encoding) -> Vec<f32> {
        known.iter().map(|k| k.euclidean_distance(probe)).collect()
    }
}

impl<M: FaceModel + ?Sized> FaceModel for Box<M> {
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>, ModelError> {
        (**self).locate(image)
    }

    fn encode(&mut self, image: &GrayImage, boxes: &[FaceBox]) -> Result<Vec<Encoding>, ModelError> {
        (**self).encode(image, boxes)
    }

    fn landmarks(
        &mut self,
        image: &GrayImage,
        boxes: &[FaceBox],
    ) -> Result<Vec<FaceLandmarks>, ModelError> {
        (**self).landmarks(image, boxes)
    }

    fn distance(&self, known: &[Encoding], probe: &Encoding) -> Vec<f32> {
        (**self).distance(known, probe)
    }
}
