//! The scanning session's control loop.
//!
//! One task owns every ledger write. It multiplexes the display tick, the
//! pipeline's event channel and the shutdown signal.

use crate::attendance::{LedgerEngine, ScanOutcome};
use crate::events::{Notifier, SessionEvent};
use crate::pipeline::{Pipeline, PipelineEvent, StopReport};
use crate::render::Renderer;
use chrono::NaiveDateTime;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("pipeline shutdown task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Source of "now" for attendance decisions.
pub trait Clock: Send {
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    CaptureFailed,
    PipelineClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub accepted_scans: usize,
    pub threads: StopReport,
}

pub struct ScanSession<C: Clock> {
    pub ledger: LedgerEngine,
    pub notifier: Arc<dyn Notifier>,
    pub renderer: Box<dyn Renderer>,
    pub clock: C,
    pub display_interval: Duration,
}

impl<C: Clock> ScanSession<C> {
    /// Drive the session until `shutdown` resolves or the camera fails, then
    /// stop the pipeline with its bounded join.
    pub async fn run(
        mut self,
        pipeline: Pipeline,
        mut events: mpsc::Receiver<PipelineEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<SessionSummary, SessionError> {
        let mut tick = tokio::time::interval(self.display_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut accepted_scans = 0;
        tracing::info!("scanning");

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => break StopReason::Requested,
                _ = tick.tick() => {
                    if let Some(frame) = pipeline.latest_frame() {
                        self.renderer.render(&frame, &pipeline.overlays());
                    }
                }
                msg = events.recv() => match msg {
                    Some(PipelineEvent::LogRequest(id)) => {
                        match self.ledger.record_scan(&id, self.clock.now()) {
                            Ok(ScanOutcome::TimeIn | ScanOutcome::Late | ScanOutcome::TimeOut) => {
                                accepted_scans += 1;
                            }
                            Ok(_) => {}
                            // Already logged and notified; scanning continues.
                            Err(e) => tracing::debug!(error = %e, "log request failed"),
                        }
                    }
                    Some(PipelineEvent::CaptureFailed(e)) => {
                        self.notifier.notify(&SessionEvent::CameraError { reason: e.to_string() });
                        break StopReason::CaptureFailed;
                    }
                    None => break StopReason::PipelineClosed,
                },
            }
        };

        tracing::info!(?reason, accepted_scans, "stopping scan session");
        let threads = tokio::task::spawn_blocking(move || pipeline.stop()).await?;
        Ok(SessionSummary {
            reason,
            accepted_scans,
            threads,
        })
    }
}
