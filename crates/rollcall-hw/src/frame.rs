//! Frame type and pixel-format conversion.

use image::imageops::{self, FilterType};
use image::GrayImage;

/// A captured grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: GrayImage,
    pub sequence: u32,
}

impl Frame {
    pub fn new(pixels: GrayImage, sequence: u32) -> Self {
        Self { pixels, sequence }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Shrink by an integer factor in each dimension (never below 1×1).
    pub fn downscaled(&self, factor: u32) -> GrayImage {
        let factor = factor.max(1);
        if factor == 1 {
            return self.pixels.clone();
        }
        let w = (self.width() / factor).max(1);
        let h = (self.height() / factor).max(1);
        imageops::resize(&self.pixels, w, h, FilterType::Triangle)
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_gray(yuyv: &[u8], width: u32, height: u32) -> Result<GrayImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let luma: Vec<u8> = yuyv[..expected].iter().step_by(2).copied().collect();
    into_image(luma, width, height)
}

/// 8-bit GREY buffers copy straight through.
pub fn grey_to_gray(buf: &[u8], width: u32, height: u32) -> Result<GrayImage, FrameError> {
    let expected = (width * height) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    into_image(buf[..expected].to_vec(), width, height)
}

/// Decode an MJPEG buffer and convert it to 8-bit luma.
pub fn mjpeg_to_gray(buf: &[u8]) -> Result<GrayImage, FrameError> {
    let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?;
    Ok(decoded.to_luma8())
}

fn into_image(luma: Vec<u8>, width: u32, height: u32) -> Result<GrayImage, FrameError> {
    let actual = luma.len();
    GrayImage::from_raw(width, height, luma).ok_or(FrameError::InvalidLength {
        expected: (width * height) as usize,
        actual,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
}
