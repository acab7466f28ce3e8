//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the detector's five keypoints onto the ArcFace reference positions
//! and resamples a 112×112 crop.

use crate::types::Point;
use image::{GrayImage, Luma};

/// ArcFace reference keypoints for a 112×112 crop.
const REFERENCE_112: [Point; 5] = [
    Point::new(38.2946, 51.6963),
    Point::new(73.5318, 51.5014),
    Point::new(56.0252, 71.7366),
    Point::new(41.5493, 92.3655),
    Point::new(70.7299, 92.2041),
];

pub const ALIGNED_SIZE: u32 = 112;

/// `dst = [a -b; b a] · src + (tx, ty)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit from `src` to `dst`.
    fn estimate(src: &[Point; 5], dst: &[Point; 5]) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &[Point; 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
            Point::new(sx / n, sy / n)
        };
        let (ms, md) = (mean(src), mean(dst));

        let (mut dot, mut cross, mut norm) = (0.0f32, 0.0f32, 0.0f32);
        for (s, d) in src.iter().zip(dst.iter()) {
            let (px, py) = (s.x - ms.x, s.y - ms.y);
            let (qx, qy) = (d.x - md.x, d.y - md.y);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            norm += px * px + py * py;
        }
        if norm < 1e-9 {
            return None;
        }

        let (a, b) = (dot / norm, cross / norm);
        Some(Self {
            a,
            b,
            tx: md.x - (a * ms.x - b * ms.y),
            ty: md.y - (b * ms.x + a * ms.y),
        })
    }

    /// Destination → source.
    fn invert(&self, p: Point) -> Point {
        let det = self.a * self.a + self.b * self.b;
        let (dx, dy) = (p.x - self.tx, p.y - self.ty);
        Point::new(
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        )
    }
}

pub(crate) fn sample_bilinear(image: &GrayImage, p: Point) -> f32 {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let at = |x: i64, y: i64| -> f32 {
        if x >= 0 && y >= 0 && x < w && y < h {
            image.get_pixel(x as u32, y as u32).0[0] as f32
        } else {
            0.0
        }
    };
    let (x0, y0) = (p.x.floor() as i64, p.y.floor() as i64);
    let (fx, fy) = (p.x - x0 as f32, p.y - y0 as f32);
    at(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + at(x0 + 1, y0) * fx * (1.0 - fy)
        + at(x0, y0 + 1) * (1.0 - fx) * fy
        + at(x0 + 1, y0 + 1) * fx * fy
}

/// Warp the face described by `keypoints` into a canonical 112×112 crop.
///
/// Degenerate keypoints (all coincident) produce a black crop.
pub fn align_face(image: &GrayImage, keypoints: &[Point; 5]) -> GrayImage {
    let Some(transform) = Similarity::estimate(keypoints, &REFERENCE_112) else {
        return GrayImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };
    GrayImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| {
        let src = transform.invert(Point::new(x as f32, y as f32));
        Luma([sample_bilinear(image, src).round().clamp(0.0, 255.0) as u8])
    })
}
