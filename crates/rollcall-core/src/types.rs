use serde::{Deserialize, Serialize};

/// A 2-D image coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn scaled(&self, factor: f32) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Bounding box for a detected face, in pixel coordinates of the image it was
/// located in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub confidence: f32,
    /// Five alignment keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth].
    /// Present when the detector produces them; required for encoding.
    pub keypoints: Option<[Point; 5]>,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Map a box found on a downsampled image back to full-resolution coordinates.
    pub fn scaled(&self, factor: f32) -> FaceBox {
        FaceBox {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            confidence: self.confidence,
            keypoints: self.keypoints.map(|kps| kps.map(|p| p.scaled(factor))),
        }
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let inter_w = (self.right.min(other.right) - self.left.max(other.left)).max(0.0);
        let inter_h = (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.width() * self.height() + other.width() * other.height() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Named facial landmark sets with guaranteed point counts.
///
/// Point order follows the iBUG 68-point annotation: eyes start at the outer
/// corner and run clockwise, so `[p1..p6]` is the canonical EAR ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub nose_bridge: [Point; 4],
    pub nose_tip: [Point; 5],
    pub chin: [Point; 17],
}

impl FaceLandmarks {
    /// Slice an iBUG 68-point annotation into the named sets.
    pub fn from_ibug68(points: &[Point; 68]) -> Self {
        let take = |start: usize| move |i: usize| points[start + i];
        Self {
            chin: std::array::from_fn(take(0)),
            nose_bridge: std::array::from_fn(take(27)),
            nose_tip: std::array::from_fn(take(31)),
            left_eye: std::array::from_fn(take(36)),
            right_eye: std::array::from_fn(take(42)),
        }
    }

    /// Lowest point of the jaw line.
    pub fn chin_point(&self) -> Point {
        self.chin[8]
    }

    pub fn scaled(&self, factor: f32) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: self.left_eye.map(|p| p.scaled(factor)),
            right_eye: self.right_eye.map(|p| p.scaled(factor)),
            nose_bridge: self.nose_bridge.map(|p| p.scaled(factor)),
            nose_tip: self.nose_tip.map(|p| p.scaled(factor)),
            chin: self.chin.map(|p| p.scaled(factor)),
        }
    }
}

/// Fixed-length face encoding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding(pub Vec<f32>);

impl Encoding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance between two encodings.
    ///
    /// Encodings of different length are incomparable and report `f32::INFINITY`,
    /// so they can never fall inside a match tolerance.
    pub fn euclidean_distance(&self, other: &Encoding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}
