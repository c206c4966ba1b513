use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::capture::{Artifact, CaptureRequest, CaptureSource};
use super::state::{Command, RecordingStatus};
use super::timer::Timer;
use crate::error::Result;

/// Read-only view of a session, usable without locking the session itself.
#[derive(Clone)]
pub struct SessionObserver {
    status: watch::Receiver<RecordingStatus>,
    elapsed: Arc<AtomicU64>,
}

impl SessionObserver {
    pub fn status(&self) -> RecordingStatus {
        *self.status.borrow()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Resolves on the next status change
    pub async fn changed(&mut self) -> Option<RecordingStatus> {
        self.status.changed().await.ok()?;
        Some(*self.status.borrow_and_update())
    }
}

/// One screen/microphone recording attempt at a time.
///
/// Commands that the transition table rejects are ignored and return the
/// current status.
pub struct CaptureSession {
    source: Box<dyn CaptureSource>,
    request: CaptureRequest,
    status: watch::Sender<RecordingStatus>,
    timer: Timer,
    artifact: Option<Artifact>,
}

impl CaptureSession {
    pub fn new(source: Box<dyn CaptureSource>, request: CaptureRequest) -> Self {
        let (status, _) = watch::channel(RecordingStatus::Idle);
        Self {
            source,
            request,
            status,
            timer: Timer::new(),
            artifact: None,
        }
    }

    pub fn observer(&self) -> SessionObserver {
        SessionObserver {
            status: self.status.subscribe(),
            elapsed: self.timer.counter(),
        }
    }

    pub fn status(&self) -> RecordingStatus {
        *self.status.borrow()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.timer.elapsed_seconds()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    fn next(&self, command: Command) -> Option<RecordingStatus> {
        let current = self.status();
        let next = current.apply(command);
        if next.is_none() {
            tracing::debug!(status = %current, command = ?command, "Ignoring command");
        }
        next
    }

    fn set_status(&self, status: RecordingStatus) {
        self.status.send_replace(status);
    }

    pub async fn start(&mut self) -> Result<RecordingStatus> {
        let Some(next) = self.next(Command::Start) else {
            return Ok(self.status());
        };

        self.artifact = None;
        self.timer.reset();

        if let Err(e) = self.source.open(self.request.clone()).await {
            self.source.release();
            tracing::warn!(error = %e, "Recording failed to start");
            return Err(e);
        }

        self.set_status(next);
        self.timer.start();
        tracing::info!(microphone = self.request.microphone, "Recording started");
        Ok(next)
    }

    pub fn pause(&mut self) -> Result<RecordingStatus> {
        let Some(next) = self.next(Command::Pause) else {
            return Ok(self.status());
        };

        self.source.pause()?;
        self.timer.stop();
        self.set_status(next);
        tracing::info!(elapsed_secs = self.elapsed_seconds(), "Recording paused");
        Ok(next)
    }

    pub fn resume(&mut self) -> Result<RecordingStatus> {
        let Some(next) = self.next(Command::Resume) else {
            return Ok(self.status());
        };

        self.source.resume()?;
        self.timer.start();
        self.set_status(next);
        tracing::info!(elapsed_secs = self.elapsed_seconds(), "Recording resumed");
        Ok(next)
    }

    pub async fn stop(&mut self) -> Result<RecordingStatus> {
        let Some(next) = self.next(Command::Stop) else {
            return Ok(self.status());
        };

        self.timer.stop();
        match self.source.finish().await {
            Ok(artifact) => {
                tracing::info!(
                    elapsed_secs = self.elapsed_seconds(),
                    bytes = artifact.len(),
                    "Recording finished"
                );
                self.artifact = Some(artifact);
                self.set_status(next);
                Ok(next)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to finalize recording");
                self.source.release();
                self.timer.reset();
                self.artifact = None;
                self.set_status(RecordingStatus::Idle);
                Err(e)
            }
        }
    }

    /// Discards the artifact and releases every capture device.
    pub fn reset(&mut self) -> RecordingStatus {
        let Some(next) = self.next(Command::Reset) else {
            return self.status();
        };

        self.timer.reset();
        self.source.release();
        self.artifact = None;
        self.set_status(next);
        next
    }

    /// Teardown regardless of state.
    pub fn shutdown(&mut self) {
        self.timer.reset();
        self.source.release();
        self.artifact = None;
        self.set_status(RecordingStatus::Idle);
    }
}
