//! Active liveness detection from facial landmarks.
//!
//! Two gates share the same primitives:
//!
//! - [`EnrollmentSession`] walks a subject through trigger → blink → tilt left
//!   → tilt right before a frontal frame is accepted for the registry.
//! - [`BlinkGate`] is the reduced variant used while scanning: a person is only
//!   logged on the rising edge of a completed blink.
//!
//! Both operate on landmarks already produced by the face model. No extra
//! inference is run.
//!
//! # Threat Coverage
//!
//! - **Blocks:** printed photographs and still images held to the camera
//!   (they never blink, so they never log attendance).
//! - **Does not block:** video replay, masks with cut-out eyes.

use crate::types::{FaceLandmarks, Point};

/// Eye aspect ratio below which an eye counts as closed.
pub const DEFAULT_EAR_THRESHOLD: f32 = 0.25;
/// Head tilt, in degrees, required in each direction during enrollment.
pub const DEFAULT_HEAD_TILT_DEGREES: f32 = 15.0;
/// Consecutive closed frames required for an enrollment blink.
pub const DEFAULT_ENROLL_BLINK_FRAMES: u32 = 3;
/// Consecutive closed frames required for a live-scanning blink. Lower than
/// enrollment because recognition only samples every few frames.
pub const DEFAULT_LIVE_BLINK_FRAMES: u32 = 2;

/// Thresholds shared by both liveness gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessConfig {
    pub ear_threshold: f32,
    pub head_tilt_degrees: f32,
    pub enroll_blink_frames: u32,
    pub live_blink_frames: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            head_tilt_degrees: DEFAULT_HEAD_TILT_DEGREES,
            enroll_blink_frames: DEFAULT_ENROLL_BLINK_FRAMES,
            live_blink_frames: DEFAULT_LIVE_BLINK_FRAMES,
        }
    }
}

/// Eye aspect ratio over the six canonical eye points:
/// `(‖p2−p6‖ + ‖p3−p5‖) / (2‖p1−p4‖)`.
///
/// A degenerate eye (zero width) reports `f32::INFINITY`, i.e. open.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= f32::EPSILON {
        return f32::INFINITY;
    }
    vertical / (2.0 * horizontal)
}

/// EAR averaged over both eyes.
pub fn mean_eye_aspect_ratio(landmarks: &FaceLandmarks) -> f32 {
    (eye_aspect_ratio(&landmarks.left_eye) + eye_aspect_ratio(&landmarks.right_eye)) / 2.0
}

/// Head roll in degrees from the nose tip to the chin.
///
/// Upright is 0°. Positive when the chin swings to the image left of the
/// nose, negative when it swings right.
pub fn head_tilt_degrees(landmarks: &FaceLandmarks) -> f32 {
    let nose = landmarks.nose_tip[0];
    let chin = landmarks.chin_point();
    (chin.y - nose.y).atan2(chin.x - nose.x).to_degrees() - 90.0
}

/// Counts a run of closed-eye observations and reports the rising edge.
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    ear_threshold: f32,
    min_closed_frames: u32,
    closed_run: u32,
}

impl BlinkDetector {
    pub fn new(ear_threshold: f32, min_closed_frames: u32) -> Self {
        Self {
            ear_threshold,
            min_closed_frames: min_closed_frames.max(1),
            closed_run: 0,
        }
    }

    /// Feed one EAR observation.
    ///
    /// Returns `true` exactly once per closed run of at least
    /// `min_closed_frames`, on the first open observation that follows it.
    pub fn observe(&mut self, ear: f32) -> bool {
        if ear < self.ear_threshold {
            self.closed_run = self.closed_run.saturating_add(1);
            return false;
        }
        let completed = self.closed_run >= self.min_closed_frames;
        self.closed_run = 0;
        completed
    }

    /// Consecutive closed observations since the last open one.
    pub fn closed_run(&self) -> u32 {
        self.closed_run
    }
}

/// Per-person blink counters for the live scanning gate.
///
/// Lives for one scanning session.
#[derive(Debug, Clone)]
pub struct BlinkGate {
    ear_threshold: f32,
    min_closed_frames: u32,
    counters: std::collections::HashMap<String, BlinkDetector>,
}

impl BlinkGate {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            ear_threshold: config.ear_threshold,
            min_closed_frames: config.live_blink_frames,
            counters: Default::default(),
        }
    }

    /// Observe a matched person's landmarks. Returns `true` when a completed
    /// blink should trigger an attendance log attempt.
    pub fn observe(&mut self, person_id: &str, landmarks: &FaceLandmarks) -> bool {
        self.observe_ear(person_id, mean_eye_aspect_ratio(landmarks))
    }

    pub fn observe_ear(&mut self, person_id: &str, ear: f32) -> bool {
        let (threshold, min) = (self.ear_threshold, self.min_closed_frames);
        self.counters
            .entry(person_id.to_string())
            .or_insert_with(|| BlinkDetector::new(threshold, min))
            .observe(ear)
    }

    /// Current closed run for a person (0 if never seen).
    pub fn closed_run(&self, person_id: &str) -> u32 {
        self.counters.get(person_id).map_or(0, BlinkDetector::closed_run)
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

/// Enrollment liveness steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollStep {
    AwaitingTrigger,
    AwaitingBlinks,
    AwaitingTiltLeft,
    AwaitingTiltRight,
    Complete,
    Aborted,
}

impl EnrollStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, EnrollStep::Complete | EnrollStep::Aborted)
    }

    /// Short prompt for the subject.
    pub fn instruction(self) -> &'static str {
        match self {
            EnrollStep::AwaitingTrigger => "look straight at the camera and press Enter",
            EnrollStep::AwaitingBlinks => "blink slowly",
            EnrollStep::AwaitingTiltLeft => "tilt your head to the left",
            EnrollStep::AwaitingTiltRight => "now tilt your head to the right",
            EnrollStep::Complete => "all set, registering",
            EnrollStep::Aborted => "enrollment cancelled",
        }
    }
}

/// One enrollment attempt.
///
/// Generic over the frame type so the reserved frontal frame can be whatever
/// the capture layer produces.
#[derive(Debug)]
pub struct EnrollmentSession<F> {
    config: LivenessConfig,
    step: EnrollStep,
    blink: BlinkDetector,
    frontal: Option<F>,
}

impl<F: Clone> EnrollmentSession<F> {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            blink: BlinkDetector::new(config.ear_threshold, config.enroll_blink_frames),
            config,
            step: EnrollStep::AwaitingTrigger,
            frontal: None,
        }
    }

    pub fn step(&self) -> EnrollStep {
        self.step
    }

    /// Feed one frame together with the landmarks of every face found in it.
    ///
    /// Frames without exactly one face are skipped: no progress, and the blink
    /// counter is left untouched. `trigger` only matters while awaiting it.
    pub fn observe(&mut self, frame: &F, faces: &[FaceLandmarks], trigger: bool) -> EnrollStep {
        if self.step.is_terminal() {
            return self.step;
        }
        let [face] = faces else {
            return self.step;
        };

        match self.step {
            EnrollStep::AwaitingTrigger => {
                if trigger {
                    self.frontal = Some(frame.clone());
                    self.step = EnrollStep::AwaitingBlinks;
                }
            }
            EnrollStep::AwaitingBlinks => {
                if self.blink.observe(mean_eye_aspect_ratio(face)) {
                    self.step = EnrollStep::AwaitingTiltLeft;
                }
            }
            EnrollStep::AwaitingTiltLeft => {
                if head_tilt_degrees(face) > self.config.head_tilt_degrees {
                    self.step = EnrollStep::AwaitingTiltRight;
                }
            }
            EnrollStep::AwaitingTiltRight => {
                if head_tilt_degrees(face) < -self.config.head_tilt_degrees {
                    self.step = EnrollStep::Complete;
                }
            }
            EnrollStep::Complete | EnrollStep::Aborted => {}
        }

        self.step
    }

    /// Cancel the attempt. The reserved frame is dropped.
    pub fn abort(&mut self) {
        self.step = EnrollStep::Aborted;
        self.frontal = None;
    }

    /// The reserved frontal frame, once the session has completed.
    pub fn into_frontal(self) -> Option<F> {
        match self.step {
            EnrollStep::Complete => self.frontal,
            _ => None,
        }
    }
}

/// Builders for synthetic landmarks, shared with downstream crates' tests.
pub mod synthetic {
    use super::*;

    /// An eye whose EAR equals `ear` exactly (width 10 px).
    pub fn eye_with_ear(cx: f32, cy: f32, ear: f32) -> [Point; 6] {
        let half_h = ear * 10.0 / 2.0;
        [
            Point::new(cx - 5.0, cy),
            Point::new(cx - 2.0, cy - half_h),
            Point::new(cx + 2.0, cy - half_h),
            Point::new(cx + 5.0, cy),
            Point::new(cx + 2.0, cy + half_h),
            Point::new(cx - 2.0, cy + half_h),
        ]
    }

    /// Landmarks with both eyes at `ear` and the head rolled by `tilt` degrees.
    pub fn face(ear: f32, tilt: f32) -> FaceLandmarks {
        let nose = Point::new(50.0, 50.0);
        let angle = (90.0 + tilt).to_radians();
        let chin = Point::new(nose.x + 40.0 * angle.cos(), nose.y + 40.0 * angle.sin());
        let mut chin_line = [Point::new(50.0, 95.0); 17];
        chin_line[8] = chin;
        FaceLandmarks {
            left_eye: eye_with_ear(35.0, 35.0, ear),
            right_eye: eye_with_ear(65.0, 35.0, ear),
            nose_bridge: [Point::new(50.0, 38.0); 4],
            nose_tip: [nose; 5],
            chin: chin_line,
        }
    }
}
