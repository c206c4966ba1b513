use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::CredentialStore;
use crate::clock::now_millis;
use crate::drive::RemoteStore;
use crate::error::{CaptureError, Result};
use crate::recording::{CaptureSession, RecordingStatus, SessionObserver};
use crate::storage::{resolve_destination, StorageResolver, StorageType, StoredRecording};

/// Everything the UI renders about the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub status: RecordingStatus,
    pub elapsed_seconds: u64,
    pub is_processing: bool,
    pub last_saved_name: Option<String>,
    pub has_artifact: bool,
    /// Whether Google Drive answered the last connectivity check
    pub online: bool,
}

/// Result of a save, including where the recording actually went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub requested: StorageType,
    pub destination: StorageType,
    pub recording: StoredRecording,
}

/// Clears the processing flag when the save future completes or is dropped.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Default display name when the user leaves the name blank
pub fn default_recording_name() -> String {
    format!("Recording {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
}

/// Composition root: one capture session, one save at a time.
pub struct RecordingController {
    session: Mutex<CaptureSession>,
    observer: SessionObserver,
    resolver: StorageResolver,
    remote: Arc<dyn RemoteStore>,
    credentials: Arc<CredentialStore>,
    preferred_storage: StorageType,
    processing: AtomicBool,
    online: AtomicBool,
    last_saved_name: RwLock<Option<String>>,
}

impl RecordingController {
    pub fn new(
        session: CaptureSession,
        resolver: StorageResolver,
        remote: Arc<dyn RemoteStore>,
        credentials: Arc<CredentialStore>,
        preferred_storage: StorageType,
    ) -> Self {
        let observer = session.observer();
        Self {
            session: Mutex::new(session),
            observer,
            resolver,
            remote,
            credentials,
            preferred_storage,
            processing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            last_saved_name: RwLock::new(None),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Asks the remote store whether it is reachable and records the answer,
    /// logging when connectivity changes.
    pub async fn refresh_connectivity(&self) -> bool {
        let online = self.remote.is_reachable().await;
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if online != was_online {
            if online {
                tracing::info!("Google Drive reachable again; uploads available");
            } else {
                tracing::warn!("Google Drive unreachable; recordings will be saved locally");
            }
        }
        online
    }

    /// Re-checks connectivity every `every` until the handle is aborted.
    pub fn spawn_connectivity_monitor(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                controller.refresh_connectivity().await;
            }
        })
    }

    pub fn observer(&self) -> SessionObserver {
        self.observer.clone()
    }

    pub async fn snapshot(&self) -> RecorderSnapshot {
        let status = self.observer.status();
        RecorderSnapshot {
            status,
            elapsed_seconds: self.observer.elapsed_seconds(),
            is_processing: self.is_processing(),
            last_saved_name: self.last_saved_name.read().await.clone(),
            has_artifact: status == RecordingStatus::Stopped,
            online: self.is_online(),
        }
    }

    pub async fn start(&self) -> Result<RecorderSnapshot> {
        self.session.lock().await.start().await?;
        Ok(self.snapshot().await)
    }

    pub async fn pause(&self) -> Result<RecorderSnapshot> {
        self.session.lock().await.pause()?;
        Ok(self.snapshot().await)
    }

    pub async fn resume(&self) -> Result<RecorderSnapshot> {
        self.session.lock().await.resume()?;
        Ok(self.snapshot().await)
    }

    pub async fn stop(&self) -> Result<RecorderSnapshot> {
        self.session.lock().await.stop().await?;
        Ok(self.snapshot().await)
    }

    pub async fn discard(&self) -> Result<RecorderSnapshot> {
        {
            // A save claims the flag before taking the session, so checking
            // under the lock cannot miss one that is about to read the artifact.
            let mut session = self.session.lock().await;
            if self.is_processing() {
                return Err(CaptureError::SaveInProgress);
            }
            session.reset();
        }
        tracing::info!("Recording discarded");
        Ok(self.snapshot().await)
    }

    /// Saves the stopped recording. A second call while one is in flight is
    /// rejected; on failure the artifact stays available for another try.
    pub async fn save(&self, name: &str, preferred: Option<StorageType>) -> Result<SaveOutcome> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Rejected save: another save is in progress");
            return Err(CaptureError::SaveInProgress);
        }
        let _guard = ProcessingGuard(&self.processing);

        let artifact = {
            let session = self.session.lock().await;
            if session.status() != RecordingStatus::Stopped {
                return Err(CaptureError::NothingToSave);
            }
            session.artifact().cloned().ok_or(CaptureError::NothingToSave)?
        };

        let name = match name.trim() {
            "" => default_recording_name(),
            trimmed => trimmed.to_string(),
        };
        let requested = preferred.unwrap_or(self.preferred_storage);

        let credential = match self.credentials.valid_at(now_millis()).await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(error = %e, "Stored Google Drive credential is unreadable");
                None
            }
        };
        let is_authenticated = credential.is_some();
        // Connectivity only matters for a drive save.
        let is_online = match requested {
            StorageType::Drive => self.refresh_connectivity().await,
            StorageType::Local => true,
        };

        let destination = resolve_destination(requested, is_online, is_authenticated);
        if destination != requested {
            tracing::warn!(
                requested = %requested,
                destination = %destination,
                online = is_online,
                authenticated = is_authenticated,
                "Saving locally instead of Google Drive"
            );
        }

        let result = match destination {
            StorageType::Local => self.resolver.write_local(&artifact, &name).await,
            StorageType::Drive => {
                self.resolver
                    .write_drive(credential.as_ref(), &artifact, &name)
                    .await
            }
        };

        let recording = match result {
            Ok(recording) => recording,
            Err(e) => {
                tracing::error!(name = %name, destination = %destination, error = %e, "Save failed");
                return Err(e);
            }
        };

        self.session.lock().await.reset();
        *self.last_saved_name.write().await = Some(name);

        Ok(SaveOutcome {
            requested,
            destination,
            recording,
        })
    }

    /// Releases the capture devices and stops the timer; used on daemon exit.
    pub async fn shutdown(&self) {
        self.session.lock().await.shutdown();
        tracing::info!("Recorder shut down");
    }
}
