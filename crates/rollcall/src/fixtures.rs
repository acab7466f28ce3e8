//! Scripted stand-ins for the camera, the face model and the notifier.

use crate::events::{Notifier, SessionEvent};
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use rollcall_core::liveness::synthetic;
use rollcall_core::{Encoding, FaceBox, FaceLandmarks, FaceModel, ModelError};
use rollcall_hw::{CameraError, Frame, FrameSource};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn gray_frame(width: u32, height: u32, sequence: u32) -> Frame {
    Frame::new(GrayImage::from_pixel(width, height, Luma([100])), sequence)
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &SessionEvent) {
        self.events.lock().push(event.clone());
    }
}

/// One face the scripted model "sees".
#[derive(Debug, Clone)]
pub struct ScriptedFace {
    pub face: FaceBox,
    pub encoding: Vec<f32>,
    pub ear: f32,
    pub tilt: f32,
}

impl ScriptedFace {
    pub fn new(encoding: Vec<f32>, ear: f32) -> Self {
        Self {
            face: FaceBox {
                left: 2.0,
                top: 3.0,
                right: 12.0,
                bottom: 13.0,
                confidence: 0.9,
                keypoints: None,
            },
            encoding,
            ear,
            tilt: 0.0,
        }
    }

    pub fn tilted(mut self, tilt: f32) -> Self {
        self.tilt = tilt;
        self
    }
}

/// Replays one entry of `script` per `locate` call, then repeats the last
/// entry forever. An empty script never finds a face.
pub struct ScriptedModel {
    script: Vec<Vec<ScriptedFace>>,
    cursor: usize,
    current: Vec<ScriptedFace>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    /// Returns the model and a counter of `locate` calls.
    pub fn new(script: Vec<Vec<ScriptedFace>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                script,
                cursor: 0,
                current: Vec::new(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl FaceModel for ScriptedModel {
    fn locate(&mut self, _image: &GrayImage) -> Result<Vec<FaceBox>, ModelError> {
        let idx = self.cursor.min(self.script.len().saturating_sub(1));
        self.current = self.script.get(idx).cloned().unwrap_or_default();
        self.cursor += 1;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.iter().map(|f| f.face.clone()).collect())
    }

    fn encode(&mut self, _image: &GrayImage, boxes: &[FaceBox]) -> Result<Vec<Encoding>, ModelError> {
        Ok(self
            .current
            .iter()
            .take(boxes.len())
            .filter(|f| !f.encoding.is_empty())
            .map(|f| Encoding(f.encoding.clone()))
            .collect())
    }

    fn landmarks(
        &mut self,
        _image: &GrayImage,
        boxes: &[FaceBox],
    ) -> Result<Vec<FaceLandmarks>, ModelError> {
        Ok(self
            .current
            .iter()
            .take(boxes.len())
            .map(|f| synthetic::face(f.ear, f.tilt))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Script {
    Endless,
    FailingAfter(usize),
    FailingFirst(usize),
}

/// A fake camera producing flat gray frames about once a millisecond.
pub struct ScriptedSource {
    width: u32,
    height: u32,
    script: Script,
    sequence: u32,
    attempts: usize,
    delivered: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn with(width: u32, height: u32, script: Script) -> Self {
        Self {
            width,
            height,
            script,
            sequence: 0,
            attempts: 0,
            delivered: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn endless(width: u32, height: u32) -> Self {
        Self::with(width, height, Script::Endless)
    }

    /// Delivers `n` frames, then fails every read.
    pub fn failing_after(width: u32, height: u32, n: usize) -> Self {
        Self::with(width, height, Script::FailingAfter(n))
    }

    /// Fails the first `n` reads, then behaves like [`Self::endless`].
    pub fn failing_first(width: u32, height: u32, n: usize) -> Self {
        Self::with(width, height, Script::FailingFirst(n))
    }

    pub fn delivered(&self) -> Arc<AtomicUsize> {
        self.delivered.clone()
    }

    /// Set once the source is dropped.
    pub fn released(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        std::thread::sleep(Duration::from_millis(1));
        self.attempts += 1;
        let delivered = self.delivered.load(Ordering::SeqCst);
        let failing = match self.script {
            Script::Endless => false,
            Script::FailingAfter(n) => delivered >= n,
            Script::FailingFirst(n) => self.attempts <= n,
        };
        if failing {
            return Err(CameraError::CaptureFailed("device unplugged".into()));
        }
        self.sequence += 1;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(gray_frame(self.width, self.height, self.sequence))
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
