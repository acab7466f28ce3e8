//! The enrollment driver: feed camera frames through the liveness session,
//! then encode the reserved frontal frame and commit the new person.

use crate::app::{App, AppError};
use crate::events::{Notifier, SessionEvent};
use rollcall_core::{EnrollStep, EnrollmentSession, FaceModel, LivenessConfig, ModelError};
use rollcall_hw::{CameraError, Frame, FrameSource};
use rollcall_store::{PersonId, Schedule, ValidationError};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("face model error: {0}")]
    Model(#[from] ModelError),
    #[error("no single face in the captured frame")]
    NoFace,
    #[error("could not compute a face encoding")]
    NoEncoding,
    #[error(transparent)]
    App(#[from] AppError),
}

/// Operator input during enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Reserve the current frame as the frontal photo.
    Capture,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub id: PersonId,
    pub name: String,
    pub schedule: Option<Schedule>,
}

/// Read operator input from stdin: an empty line captures, `q` aborts.
/// End of input aborts.
pub fn stdin_triggers() -> std::io::Result<Receiver<Trigger>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("rollcall-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let trigger = match line.as_deref().map(str::trim) {
                    Ok("q") | Ok("quit") => Trigger::Abort,
                    Ok(_) => Trigger::Capture,
                    Err(_) => Trigger::Abort,
                };
                if tx.send(trigger).is_err() || trigger == Trigger::Abort {
                    return;
                }
            }
            let _ = tx.send(Trigger::Abort);
        })?;
    Ok(rx)
}

pub struct EnrollDriver<'a, S, M> {
    pub app: &'a App,
    pub source: S,
    pub model: M,
    pub liveness: LivenessConfig,
    pub notifier: Arc<dyn Notifier>,
}

impl<S: FrameSource, M: FaceModel> EnrollDriver<'_, S, M> {
    /// Run one enrollment to completion or abort.
    ///
    /// The id and name are validated before the camera is read. Failures
    /// are notified as `EnrollmentFailed` and returned.
    pub fn run(&mut self, request: &EnrollRequest, triggers: &Receiver<Trigger>) -> Result<EnrollOutcome, EnrollError> {
        let result = self.drive(request, triggers);
        if let Err(e) = &result {
            self.notifier.notify(&SessionEvent::EnrollmentFailed { reason: e.to_string() });
        }
        result
    }

    fn drive(&mut self, request: &EnrollRequest, triggers: &Receiver<Trigger>) -> Result<EnrollOutcome, EnrollError> {
        self.app.people().check_new(&request.id, &request.name).map_err(AppError::from)?;
        if self.app.registry().contains(&request.id) {
            return Err(AppError::from(ValidationError::DuplicateId(request.id.to_string())).into());
        }

        let mut session = EnrollmentSession::<Frame>::new(self.liveness);
        let mut shown = session.step();
        self.notifier.notify(&SessionEvent::EnrollmentStep(shown));
        tracing::info!(id = %request.id, "enrollment started");

        while !session.step().is_terminal() {
            let trigger = match triggers.try_recv() {
                Ok(Trigger::Capture) => true,
                Ok(Trigger::Abort) | Err(TryRecvError::Disconnected) => {
                    session.abort();
                    false
                }
                Err(TryRecvError::Empty) => false,
            };

            if !session.step().is_terminal() {
                let frame = self.source.read_frame()?;
                let faces = match self.landmarks(&frame) {
                    Ok(faces) => faces,
                    Err(e) => {
                        tracing::warn!(error = %e, "face analysis failed; skipping frame");
                        continue;
                    }
                };
                if trigger && faces.len() != 1 {
                    tracing::info!(faces = faces.len(), "capture ignored; exactly one face required");
                }
                session.observe(&frame, &faces, trigger);
            }

            if session.step() != shown {
                shown = session.step();
                self.notifier.notify(&SessionEvent::EnrollmentStep(shown));
            }
        }

        let Some(frontal) = session.into_frontal() else {
            tracing::info!(id = %request.id, "enrollment aborted");
            return Ok(EnrollOutcome::Aborted);
        };

        let encoding = self.encode_frontal(&frontal)?;
        self.app.commit_enrollment(
            &request.id,
            &request.name,
            request.schedule.clone(),
            encoding,
            &frontal.pixels,
        )?;
        let name = self
            .app
            .people()
            .get(&request.id)
            .map_or_else(|| request.name.clone(), |p| p.name.clone());
        self.notifier.notify(&SessionEvent::EnrollmentSucceeded {
            id: request.id.clone(),
            name,
        });
        Ok(EnrollOutcome::Enrolled)
    }

    fn landmarks(&mut self, frame: &Frame) -> Result<Vec<rollcall_core::FaceLandmarks>, ModelError> {
        let boxes = self.model.locate(&frame.pixels)?;
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        self.model.landmarks(&frame.pixels, &boxes)
    }

    fn encode_frontal(&mut self, frontal: &Frame) -> Result<rollcall_core::Encoding, EnrollError> {
        let boxes = self.model.locate(&frontal.pixels)?;
        if boxes.len() != 1 {
            return Err(EnrollError::NoFace);
        }
        self.model
            .encode(&frontal.pixels, &boxes)?
            .into_iter()
            .next()
            .filter(|e| !e.is_empty())
            .ok_or(EnrollError::NoEncoding)
    }
}
