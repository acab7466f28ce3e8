//! Camera and recognition threads around a single-slot frame buffer.
//!
//! The camera thread overwrites the slot as fast as frames arrive. The
//! recognition worker picks up new frames, runs the face model on every Nth
//! one, and publishes overlays for the display loop. Log requests and capture
//! failures go to the control loop over a channel.

use crate::shared::Shared;
use rollcall_core::liveness::BlinkGate;
use rollcall_core::{nearest_match, FaceBox, FaceModel, LivenessConfig};
use rollcall_hw::{CameraError, Frame, FrameSource};
use rollcall_store::{PersonId, Registry, Roster};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Messages from the pipeline threads to the control loop.
#[derive(Debug)]
pub enum PipelineEvent {
    /// A recognized person completed a live blink.
    LogRequest(PersonId),
    /// The camera failed; the camera thread has exited.
    CaptureFailed(CameraError),
}

/// The latest captured frame. No queue: each write replaces the previous one.
#[derive(Debug, Default)]
pub struct FrameSlot {
    inner: Mutex<Option<(u64, Frame)>>,
}

impl FrameSlot {
    pub fn put(&self, frame: Frame) {
        let mut guard = self.inner.lock();
        let generation = guard.as_ref().map_or(1, |(g, _)| g + 1);
        *guard = Some((generation, frame));
    }

    /// A copy of the latest frame.
    pub fn latest(&self) -> Option<Frame> {
        self.inner.lock().as_ref().map(|(_, f)| f.clone())
    }

    /// A copy of the latest frame if it is newer than `seen`.
    fn newer_than(&self, seen: u64) -> Option<(u64, Frame)> {
        match self.inner.lock().as_ref() {
            Some((g, f)) if *g != seen => Some((*g, f.clone())),
            _ => None,
        }
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Known { id: PersonId, name: String },
    Unknown,
}

impl Label {
    pub fn text(&self) -> &str {
        match self {
            Label::Known { name, .. } => name,
            Label::Unknown => "Unknown",
        }
    }
}

/// One annotated face, in full-resolution frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub face: FaceBox,
    pub label: Label,
    /// Closed-eye run for a known face; drives the "blinking" highlight.
    pub closed_run: u32,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub recognition_interval: u32,
    pub downscale: u32,
    pub match_tolerance: f32,
    pub camera_poll: Duration,
    pub worker_idle: Duration,
    pub join_timeout: Duration,
    pub warmup_frames: usize,
    pub liveness: LivenessConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            recognition_interval: config.recognition_interval.max(1),
            downscale: config.downscale.max(1),
            match_tolerance: config.match_tolerance,
            camera_poll: Duration::from_millis(config.camera_poll_ms),
            worker_idle: Duration::from_millis(config.worker_idle_ms.max(1)),
            join_timeout: Duration::from_millis(config.join_timeout_ms),
            warmup_frames: config.warmup_frames,
            liveness: config.liveness(),
        }
    }
}

/// Read-only views the worker matches against.
#[derive(Clone)]
pub struct Gallery {
    pub registry: Shared<Registry>,
    pub roster: Shared<Roster>,
}

/// Whether each thread exited before the join deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub camera_joined: bool,
    pub worker_joined: bool,
}

pub struct Pipeline {
    stop: Arc<AtomicBool>,
    slot: Arc<FrameSlot>,
    overlays: Shared<Vec<Overlay>>,
    camera: JoinHandle<()>,
    worker: JoinHandle<()>,
    join_timeout: Duration,
}

impl Pipeline {
    pub fn start<S, M>(
        source: S,
        model: M,
        gallery: Gallery,
        config: PipelineConfig,
        events: mpsc::Sender<PipelineEvent>,
    ) -> std::io::Result<Self>
    where
        S: FrameSource + 'static,
        M: FaceModel + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let slot = Arc::new(FrameSlot::default());
        let overlays = Shared::new(Vec::new());

        let camera = {
            let (stop, slot, events) = (stop.clone(), slot.clone(), events.clone());
            let (poll, warmup) = (config.camera_poll, config.warmup_frames);
            std::thread::Builder::new()
                .name("rollcall-camera".into())
                .spawn(move || camera_loop(source, &slot, &stop, &events, poll, warmup))?
        };

        let worker = {
            let worker = Worker {
                model,
                gallery,
                gate: BlinkGate::new(&config.liveness),
                overlays: overlays.clone(),
                events,
                config: config.clone(),
            };
            let (stop_w, slot_w) = (stop.clone(), slot.clone());
            let spawned = std::thread::Builder::new()
                .name("rollcall-recognition".into())
                .spawn(move || worker.run(&slot_w, &stop_w));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    stop.store(true, Ordering::SeqCst);
                    let _ = camera.join();
                    return Err(e);
                }
            }
        };

        tracing::info!(
            interval = config.recognition_interval,
            downscale = config.downscale,
            "pipeline started"
        );
        Ok(Self {
            stop,
            slot,
            overlays,
            camera,
            worker,
            join_timeout: config.join_timeout,
        })
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.slot.latest()
    }

    /// The most recent overlays. May lag the latest frame.
    pub fn overlays(&self) -> Arc<Vec<Overlay>> {
        self.overlays.load()
    }

    /// Signal both threads and wait up to the join timeout for each.
    ///
    /// A thread still running at the deadline is detached and logged.
    pub fn stop(self) -> StopReport {
        self.stop.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + self.join_timeout;
        let camera_joined = join_until(self.camera, deadline, "camera");
        let worker_joined = join_until(self.worker, deadline, "recognition");
        tracing::info!(camera_joined, worker_joined, "pipeline stopped");
        StopReport {
            camera_joined,
            worker_joined,
        }
    }
}

fn join_until(handle: JoinHandle<()>, deadline: Instant, name: &str) -> bool {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(thread = name, "thread did not exit before join timeout; detaching");
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        tracing::error!(thread = name, "thread panicked");
    }
    true
}

fn camera_loop<S: FrameSource>(
    mut source: S,
    slot: &FrameSlot,
    stop: &AtomicBool,
    events: &mpsc::Sender<PipelineEvent>,
    poll: Duration,
    warmup: usize,
) {
    tracing::debug!(warmup, "camera thread started");
    let mut read = 0usize;
    while !stop.load(Ordering::SeqCst) {
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, warming_up = read < warmup, "camera read failed");
                let _ = events.blocking_send(PipelineEvent::CaptureFailed(e));
                break;
            }
        };
        read += 1;
        // Auto-exposure settles over the first frames; they are read, not shown.
        if read <= warmup {
            continue;
        }
        slot.put(frame);
        if !poll.is_zero() {
            std::thread::sleep(poll);
        }
    }

    slot.clear();
    drop(source);
    tracing::debug!("camera thread exiting; device released");
}

struct Worker<M> {
    model: M,
    gallery: Gallery,
    gate: BlinkGate,
    overlays: Shared<Vec<Overlay>>,
    events: mpsc::Sender<PipelineEvent>,
    config: PipelineConfig,
}

impl<M: FaceModel> Worker<M> {
    fn run(mut self, slot: &FrameSlot, stop: &AtomicBool) {
        tracing::debug!("recognition thread started");
        let mut seen = 0u64;
        let mut opportunities = 0u64;

        while !stop.load(Ordering::SeqCst) {
            let Some((generation, frame)) = slot.newer_than(seen) else {
                std::thread::sleep(self.config.worker_idle);
                continue;
            };
            seen = generation;
            let due = opportunities % u64::from(self.config.recognition_interval) == 0;
            opportunities += 1;
            if !due {
                continue;
            }

            match self.recognize(&frame) {
                Ok(overlays) => self.overlays.store(overlays),
                Err(e) => tracing::warn!(error = %e, "recognition cycle failed"),
            }
            if self.events.is_closed() {
                break;
            }
        }
        tracing::debug!("recognition thread exiting");
    }

    /// locate → encode → landmarks → match → blink gate, on a downscaled copy.
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<Overlay>, rollcall_core::ModelError> {
        let factor = self.config.downscale;
        let small = frame.downscaled(factor);

        let boxes = self.model.locate(&small)?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.model.encode(&small, &boxes)?;
        let landmarks = self.model.landmarks(&small, &boxes)?;

        let registry = self.gallery.registry.load();
        let roster = self.gallery.roster.load();
        let known = registry.encodings();

        let mut overlays = Vec::with_capacity(boxes.len());
        for (i, face) in boxes.iter().enumerate() {
            let matched = encodings
                .get(i)
                .and_then(|enc| nearest_match(&self.model.distance(&known, enc), self.config.match_tolerance))
                .and_then(|m| registry.id_at(m.index));

            let (label, closed_run) = match matched {
                Some(id) => {
                    if let Some(lm) = landmarks.get(i) {
                        if self.gate.observe(id.as_str(), lm) {
                            tracing::debug!(id = %id, "live blink completed");
                            if self.events.blocking_send(PipelineEvent::LogRequest(id.clone())).is_err() {
                                tracing::debug!("control loop gone; dropping log request");
                            }
                        }
                    }
                    let name = roster
                        .get(id)
                        .map_or_else(|| id.to_string(), |p| p.name.clone());
                    (
                        Label::Known {
                            id: id.clone(),
                            name,
                        },
                        self.gate.closed_run(id.as_str()),
                    )
                }
                None => (Label::Unknown, 0),
            };

            overlays.push(Overlay {
                face: face.scaled(factor as f32),
                label,
                closed_run,
            });
        }
        Ok(overlays)
    }
}
