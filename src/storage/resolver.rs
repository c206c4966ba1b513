use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::models::{Location, StorageType, StoredRecording};
use super::registry::RecordingsRegistry;
use crate::auth::CloudCredential;
use crate::clock::now_millis;
use crate::drive::RemoteStore;
use crate::error::{CaptureError, Result};
use crate::recording::Artifact;

/// Decides where a save goes. Connectivity and authorization always win
/// over a drive preference.
pub fn resolve_destination(
    preferred: StorageType,
    is_online: bool,
    is_cloud_authenticated: bool,
) -> StorageType {
    if !is_online || !is_cloud_authenticated || preferred == StorageType::Local {
        StorageType::Local
    } else {
        StorageType::Drive
    }
}

/// Millisecond stamps that never repeat within the process.
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicU64,
}

impl IdClock {
    pub fn next(&self) -> u64 {
        let now = now_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Writes artifacts to their destination and records them in the registry.
pub struct StorageResolver {
    registry: Arc<RecordingsRegistry>,
    remote: Arc<dyn RemoteStore>,
    media_dir: PathBuf,
    ids: IdClock,
}

impl StorageResolver {
    pub fn new(registry: Arc<RecordingsRegistry>, remote: Arc<dyn RemoteStore>, media_dir: PathBuf) -> Self {
        Self {
            registry,
            remote,
            media_dir,
            ids: IdClock::default(),
        }
    }

    pub fn registry(&self) -> &Arc<RecordingsRegistry> {
        &self.registry
    }

    pub async fn write_local(&self, artifact: &Artifact, name: &str) -> Result<StoredRecording> {
        let created_at = self.ids.next();
        tokio::fs::create_dir_all(&self.media_dir).await?;
        let path = self.media_dir.join(format!(
            "{}-{}.{}",
            StorageType::Local.id_prefix(),
            created_at,
            artifact.extension()
        ));
        tokio::fs::write(&path, &artifact.data).await?;

        let recording = StoredRecording::new(
            name,
            created_at,
            Location::Local { path: path.clone() },
            artifact.len() as u64,
        );

        if let Err(e) = self.registry.prepend(recording.clone()).await {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "Failed to remove unregistered recording file"
                );
            }
            return Err(e);
        }

        tracing::info!(
            id = %recording.id,
            name = %name,
            path = %path.display(),
            "Recording saved locally"
        );
        Ok(recording)
    }

    pub async fn write_drive(
        &self,
        credential: Option<&CloudCredential>,
        artifact: &Artifact,
        name: &str,
    ) -> Result<StoredRecording> {
        let created_at = self.ids.next();
        let credential = credential
            .filter(|c| c.is_valid_at(now_millis()))
            .ok_or(CaptureError::NotAuthenticated)?;

        let file_name = format!("{}.{}", name, artifact.extension());
        let file_id = self.remote.upload(credential, &file_name, artifact).await?;

        let recording = StoredRecording::new(
            name,
            created_at,
            Location::Drive {
                drive_file_id: file_id.clone(),
            },
            artifact.len() as u64,
        );
        if let Err(e) = self.registry.prepend(recording.clone()).await {
            // Nothing will reference the upload, so take it back off Drive.
            if let Err(cleanup) = self.remote.delete(credential, &file_id).await {
                tracing::warn!(
                    file_id = %file_id,
                    error = %cleanup,
                    "Failed to remove unregistered upload from Google Drive"
                );
            }
            return Err(e);
        }

        tracing::info!(
            id = %recording.id,
            name = %name,
            "Recording uploaded to Google Drive"
        );
        Ok(recording)
    }
}
