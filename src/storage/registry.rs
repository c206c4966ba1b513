use std::sync::Arc;

use tokio::sync::Mutex;

use super::kv::KvStore;
use super::models::StoredRecording;
use crate::auth::CredentialStore;
use crate::clock::now_millis;
use crate::drive::RemoteStore;
use crate::error::{CaptureError, Result};

pub const REGISTRY_KEY: &str = "cloud-capture-recordings";

/// Newest-first list of saved recordings, persisted under one key.
///
/// Every mutation is a read-modify-write of the whole list under `write_lock`,
/// so concurrent writers cannot lose each other's updates. Drive-backed
/// records are mirrored to the remote on rename/delete, best-effort.
pub struct RecordingsRegistry {
    store: KvStore,
    write_lock: Mutex<()>,
    remote: Arc<dyn RemoteStore>,
    credentials: Arc<CredentialStore>,
}

impl RecordingsRegistry {
    pub fn new(store: KvStore, remote: Arc<dyn RemoteStore>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            remote,
            credentials,
        }
    }

    pub async fn list(&self) -> Result<Vec<StoredRecording>> {
        match self.store.get::<Vec<StoredRecording>>(REGISTRY_KEY).await {
            Ok(recordings) => Ok(recordings
                .unwrap_or_default()
                .into_iter()
                .filter(|r| {
                    let consistent = r.is_consistent();
                    if !consistent {
                        tracing::warn!(
                            id = %r.id,
                            storage_type = %r.storage_type,
                            "Skipping recording whose storage type disagrees with its location"
                        );
                    }
                    consistent
                })
                .collect()),
            Err(CaptureError::SerializationFailed(e)) => {
                tracing::error!(error = %e, "Recordings registry is unreadable, treating it as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredRecording>> {
        Ok(self.list().await?.into_iter().find(|r| r.id == id))
    }

    pub async fn prepend(&self, recording: StoredRecording) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut recordings = self.list().await?;
        if recordings.iter().any(|r| r.id == recording.id) {
            return Err(CaptureError::internal(format!(
                "Recording id {} already exists",
                recording.id
            )));
        }
        recordings.insert(0, recording);
        self.store.put(REGISTRY_KEY, &recordings).await
    }

    /// Renames the record; returns `None` when no record has this id.
    pub async fn rename(&self, id: &str, name: &str) -> Result<Option<StoredRecording>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CaptureError::InvalidName("name must not be empty".into()));
        }

        let renamed = {
            let _guard = self.write_lock.lock().await;
            let mut recordings = self.list().await?;
            let Some(recording) = recordings.iter_mut().find(|r| r.id == id) else {
                return Ok(None);
            };
            recording.name = name.to_string();
            let renamed = recording.clone();
            self.store.put(REGISTRY_KEY, &recordings).await?;
            renamed
        };

        if let Some(file_id) = renamed.drive_file_id() {
            self.mirror_rename(file_id, name).await;
        }
        tracing::info!(id = %id, name = %name, "Recording renamed");
        Ok(Some(renamed))
    }

    /// Deletes the record; a missing id leaves the registry untouched.
    pub async fn delete(&self, id: &str) -> Result<Option<StoredRecording>> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut recordings = self.list().await?;
            let Some(index) = recordings.iter().position(|r| r.id == id) else {
                return Ok(None);
            };
            let removed = recordings.remove(index);
            self.store.put(REGISTRY_KEY, &recordings).await?;
            removed
        };

        if let Some(file_id) = removed.drive_file_id() {
            self.mirror_delete(file_id).await;
        }
        if let Some(path) = removed.local_path() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove local recording file");
            }
        }
        tracing::info!(id = %id, "Recording deleted");
        Ok(Some(removed))
    }

    async fn mirror_rename(&self, file_id: &str, name: &str) {
        let Some(credential) = self.mirror_credential("rename").await else {
            return;
        };
        let file_name = format!("{}.webm", name);
        if let Err(e) = self.remote.rename(&credential, file_id, &file_name).await {
            tracing::warn!(file_id = %file_id, error = %e, "Failed to rename file on Google Drive");
        }
    }

    async fn mirror_delete(&self, file_id: &str) {
        let Some(credential) = self.mirror_credential("delete").await else {
            return;
        };
        if let Err(e) = self.remote.delete(&credential, file_id).await {
            tracing::warn!(file_id = %file_id, error = %e, "Failed to delete file on Google Drive");
        }
    }

    async fn mirror_credential(&self, operation: &str) -> Option<crate::auth::CloudCredential> {
        match self.credentials.valid_at(now_millis()).await {
            Ok(Some(credential)) => Some(credential),
            Ok(None) => {
                tracing::warn!(operation = %operation, "Skipping Google Drive mirror: not authenticated");
                None
            }
            Err(e) => {
                tracing::warn!(operation = %operation, error = %e, "Skipping Google Drive mirror: credential unreadable");
                None
            }
        }
    }
}
