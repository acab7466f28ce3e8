//! Outward notifications. Fire-and-forget: a notifier never fails the caller.

use chrono::NaiveTime;
use rollcall_core::EnrollStep;
use rollcall_store::PersonId;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    EnrollmentStep(EnrollStep),
    EnrollmentSucceeded { id: PersonId, name: String },
    EnrollmentFailed { reason: String },
    TimeIn { id: PersonId, name: String, at: NaiveTime },
    Late { id: PersonId, name: String, at: NaiveTime, expected: NaiveTime },
    /// A later scan the same day; time-out was updated.
    ScanRecorded { id: PersonId, name: String, at: NaiveTime },
    CameraError { reason: String },
    DataRestored { file: &'static str, backup: PathBuf },
    DataCorrupted { file: &'static str },
    LoggingFailed { id: PersonId, reason: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &SessionEvent);
}

/// Logs every event and optionally rings the terminal bell.
pub struct ConsoleNotifier {
    sound: bool,
}

impl ConsoleNotifier {
    pub fn new(sound: bool) -> Self {
        Self { sound }
    }

    fn chime(&self) {
        if !self.sound {
            return;
        }
        // Short-lived so the caller never waits on the terminal.
        let spawned = std::thread::Builder::new()
            .name("rollcall-chime".into())
            .spawn(|| {
                let mut err = std::io::stderr();
                let _ = err.write_all(b"\x07");
                let _ = err.flush();
            });
        if let Err(e) = spawned {
            tracing::debug!(error = %e, "could not spawn chime thread");
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, event: &SessionEvent) {
        match event {
            SessionEvent::EnrollmentStep(step) => {
                tracing::info!(?step, "{}", step.instruction());
            }
            SessionEvent::EnrollmentSucceeded { id, name } => {
                tracing::info!(id = %id, name = %name, "enrollment complete");
                self.chime();
            }
            SessionEvent::EnrollmentFailed { reason } => {
                tracing::warn!(reason = %reason, "enrollment failed");
            }
            SessionEvent::TimeIn { id, name, at } => {
                tracing::info!(id = %id, name = %name, at = %at, "time-in");
                self.chime();
            }
            SessionEvent::Late { id, name, at, expected } => {
                tracing::info!(id = %id, name = %name, at = %at, expected = %expected, "late time-in");
                self.chime();
            }
            SessionEvent::ScanRecorded { id, name, at } => {
                tracing::info!(id = %id, name = %name, at = %at, "time-out recorded");
                self.chime();
            }
            SessionEvent::CameraError { reason } => {
                tracing::error!(reason = %reason, "camera error; scanning stopped");
            }
            SessionEvent::DataRestored { file, backup } => {
                tracing::warn!(file, backup = %backup.display(), "data restored from backup");
            }
            SessionEvent::DataCorrupted { file } => {
                tracing::error!(file, "data corrupted and no backup readable; starting empty");
            }
            SessionEvent::LoggingFailed { id, reason } => {
                tracing::error!(id = %id, reason = %reason, "attendance logging failed");
            }
        }
    }
}
