//! Display sinks for the scan session.

use crate::pipeline::{Label, Overlay};
use image::{GrayImage, Luma};
use rollcall_hw::Frame;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

pub trait Renderer: Send {
    /// Draw one display tick. Never fails the session.
    fn render(&mut self, frame: &Frame, overlays: &[Overlay]);
}

/// Logs the set of visible labels whenever it changes.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last: Vec<String>,
}

impl Renderer for LogRenderer {
    fn render(&mut self, _frame: &Frame, overlays: &[Overlay]) {
        let labels: Vec<String> = overlays.iter().map(|o| o.label.text().to_string()).collect();
        if labels != self.last {
            tracing::info!(faces = ?labels, "in view");
            self.last = labels;
        }
    }
}

const KNOWN_SHADE: u8 = 255;
const UNKNOWN_SHADE: u8 = 0;
const BLINKING_SHADE: u8 = 160;

/// Writes the latest frame with boxes drawn in to a JPEG file.
///
/// Encoding happens on a writer thread fed through a one-slot channel. A
/// tick that finds the writer still busy is dropped, so the control loop
/// never waits on the disk.
pub struct PreviewRenderer {
    log: LogRenderer,
    tx: Option<SyncSender<GrayImage>>,
    writer: Option<JoinHandle<()>>,
}

impl PreviewRenderer {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::sync_channel::<GrayImage>(1);
        let writer = std::thread::Builder::new()
            .name("rollcall-preview".into())
            .spawn(move || {
                for image in rx {
                    if let Err(e) = write_preview(&path, &image) {
                        tracing::debug!(path = %path.display(), error = %e, "preview write failed");
                    }
                }
            })?;
        Ok(Self {
            log: LogRenderer::default(),
            tx: Some(tx),
            writer: Some(writer),
        })
    }
}

fn write_preview(path: &Path, image: &GrayImage) -> Result<(), image::ImageError> {
    let tmp = path.with_extension("tmp.jpg");
    image.save_with_format(&tmp, image::ImageFormat::Jpeg)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl Renderer for PreviewRenderer {
    fn render(&mut self, frame: &Frame, overlays: &[Overlay]) {
        self.log.render(frame, overlays);
        let Some(tx) = &self.tx else {
            return;
        };
        let mut image = frame.pixels.clone();
        for overlay in overlays {
            draw_box(&mut image, overlay);
        }
        match tx.try_send(image) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("preview writer stopped; disabling preview");
                self.tx = None;
            }
        }
    }
}

impl Drop for PreviewRenderer {
    /// Flush the queued frame before returning.
    fn drop(&mut self) {
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::error!("preview writer panicked");
            }
        }
    }
}

fn shade(overlay: &Overlay) -> u8 {
    match overlay.label {
        Label::Unknown => UNKNOWN_SHADE,
        Label::Known { .. } if overlay.closed_run > 0 => BLINKING_SHADE,
        Label::Known { .. } => KNOWN_SHADE,
    }
}

/// Two-pixel outline, clipped to the image.
fn draw_box(image: &mut GrayImage, overlay: &Overlay) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max - 1);
    let (x0, x1) = (clamp(overlay.face.left, w), clamp(overlay.face.right, w));
    let (y0, y1) = (clamp(overlay.face.top, h), clamp(overlay.face.bottom, h));
    let px = Luma([shade(overlay)]);

    for t in 0..2 {
        for x in x0..=x1 {
            image.put_pixel(x, (y0 + t).min(h - 1), px);
            image.put_pixel(x, y1.saturating_sub(t), px);
        }
        for y in y0..=y1 {
            image.put_pixel((x0 + t).min(w - 1), y, px);
            image.put_pixel(x1.saturating_sub(t), y, px);
        }
    }
}
