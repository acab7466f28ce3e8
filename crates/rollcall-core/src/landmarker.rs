//! 68-point facial landmarks via the insightface 1k3d68 model.
//!
//! The network sees a 192×192 square crop centred on the detection box with
//! 1.5× margin. Its output ends with 68 `(x, y, z)` triples in `[-1, 1]` crop
//! space; only `x` and `y` are used.

use crate::alignment::sample_bilinear;
use crate::types::{FaceBox, FaceLandmarks, Point};
use image::{GrayImage, Luma};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 192;
const CROP_MARGIN: f32 = 1.5;
const POINT_COUNT: usize = 68;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Square crop around a face box, scaled to the network input.
#[derive(Debug, Clone, Copy)]
struct Crop {
    center: Point,
    scale: f32,
}

impl Crop {
    fn around(face: &FaceBox) -> Self {
        let side = (face.width().max(face.height()) * CROP_MARGIN).max(1.0);
        Self {
            center: face.center(),
            scale: INPUT_SIZE as f32 / side,
        }
    }

    fn to_image(&self, p: Point) -> Point {
        let half = INPUT_SIZE as f32 / 2.0;
        Point::new(
            (p.x - half) / self.scale + self.center.x,
            (p.y - half) / self.scale + self.center.y,
        )
    }

    fn extract(&self, image: &GrayImage) -> GrayImage {
        GrayImage::from_fn(INPUT_SIZE, INPUT_SIZE, |x, y| {
            let src = self.to_image(Point::new(x as f32, y as f32));
            Luma([sample_bilinear(image, src).round().clamp(0.0, 255.0) as u8])
        })
    }
}

pub struct FaceLandmarker {
    session: Session,
}

impl FaceLandmarker {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;
        tracing::info!(path = %model_path.display(), "loaded 68-point landmarker");
        Ok(Self { session })
    }

    pub fn landmarks(&mut self, image: &GrayImage, face: &FaceBox) -> Result<FaceLandmarks, LandmarkError> {
        let crop = Crop::around(face);
        let input = preprocess(&crop.extract(image));

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        let points = decode(raw, &crop)?;
        Ok(FaceLandmarks::from_ibug68(&points))
    }
}

/// The model normalises internally; raw pixel values go in.
fn preprocess(crop: &GrayImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        let v = pixel.0[0] as f32;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }
    tensor
}

fn decode(raw: &[f32], crop: &Crop) -> Result<[Point; POINT_COUNT], LandmarkError> {
    let needed = POINT_COUNT * 3;
    if raw.len() < needed {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected at least {needed} values, got {}",
            raw.len()
        )));
    }
    let tail = &raw[raw.len() - needed..];
    let half = INPUT_SIZE as f32 / 2.0;
    Ok(std::array::from_fn(|i| {
        let (x, y) = (tail[i * 3], tail[i * 3 + 1]);
        crop.to_image(Point::new((x + 1.0) * half, (y + 1.0) * half))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(left: f32, top: f32, side: f32) -> FaceBox {
        FaceBox {
            left,
            top,
            right: left + side,
            bottom: top + side,
            confidence: 1.0,
            keypoints: None,
        }
    }

    #[test]
    fn test_crop_centre_maps_to_box_centre() {
        let crop = Crop::around(&face(100.0, 50.0, 64.0));
        let p = crop.to_image(Point::new(96.0, 96.0));
        assert!((p.x - 132.0).abs() < 1e-3 && (p.y - 82.0).abs() < 1e-3, "{p:?}");
    }

    #[test]
    fn test_crop_edge_covers_margin() {
        // 64px box with 1.5× margin spans 96px, so the crop edge is 48px from centre.
        let crop = Crop::around(&face(0.0, 0.0, 64.0));
        let p = crop.to_image(Point::new(0.0, 0.0));
        assert!((p.x - (32.0 - 48.0)).abs() < 1e-3, "{p:?}");
    }

    #[test]
    fn test_decode_uses_trailing_68_points() {
        let crop = Crop::around(&face(0.0, 0.0, 128.0));
        // Leading junk followed by all-zero normalised points → crop centre.
        let mut raw = vec![9.0; 30];
        raw.extend(vec![0.0; POINT_COUNT * 3]);
        let pts = decode(&raw, &crop).unwrap();
        assert!(pts.iter().all(|p| (p.x - 64.0).abs() < 1e-3 && (p.y - 64.0).abs() < 1e-3));
    }

    #[test]
    fn test_decode_short_output_is_error() {
        let crop = Crop::around(&face(0.0, 0.0, 10.0));
        assert!(decode(&[0.0; 10], &crop).is_err());
    }

    #[test]
    fn test_extract_size() {
        let img = GrayImage::from_pixel(80, 60, Luma([40]));
        let crop = Crop::around(&face(10.0, 10.0, 30.0)).extract(&img);
        assert_eq!(crop.dimensions(), (192, 192));
    }
}
