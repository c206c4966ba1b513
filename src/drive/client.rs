use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::remote::RemoteStore;
use crate::auth::CloudCredential;
use crate::config::parse_var;
use crate::error::{CaptureError, Result};
use crate::recording::Artifact;

const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com";
const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONNECTIVITY_INTERVAL_SECS: u64 = 15;
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub api_url: String,
    pub upload_url: String,
    pub timeout_secs: u64,
    /// How often the daemon re-checks whether Drive is reachable
    pub connectivity_interval_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_DRIVE_API_URL.to_string(),
            upload_url: DEFAULT_DRIVE_UPLOAD_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connectivity_interval_secs: DEFAULT_CONNECTIVITY_INTERVAL_SECS,
        }
    }
}

impl DriveConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("DRIVE_API_URL")
            .unwrap_or_else(|_| DEFAULT_DRIVE_API_URL.to_string());
        let upload_url = std::env::var("DRIVE_UPLOAD_URL")
            .unwrap_or_else(|_| DEFAULT_DRIVE_UPLOAD_URL.to_string());

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            upload_url: upload_url.trim_end_matches('/').to_string(),
            timeout_secs: parse_var("DRIVE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            connectivity_interval_secs: parse_var(
                "DRIVE_CONNECTIVITY_INTERVAL_SECS",
                DEFAULT_CONNECTIVITY_INTERVAL_SECS,
            )?
            .max(1),
        })
    }

    /// Same API base for uploads and metadata calls, as used against a local fake
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            api_url: base.clone(),
            upload_url: base,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connectivity_interval_secs: DEFAULT_CONNECTIVITY_INTERVAL_SECS,
        }
    }
}

/// Metadata part of a multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
}

/// Drive `files` resource, trimmed to what the daemon reads back
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Google Drive v3 REST client.
pub struct DriveClient {
    config: DriveConfig,
    client: reqwest::Client,
}

impl DriveClient {
    pub fn new(config: DriveConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CaptureError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn upload_endpoint(&self) -> String {
        format!(
            "{}/upload/drive/v3/files?uploadType=multipart",
            self.config.upload_url
        )
    }

    fn file_endpoint(&self, file_id: &str) -> String {
        format!(
            "{}/drive/v3/files/{}",
            self.config.api_url,
            urlencoding::encode(file_id)
        )
    }

    /// Upload the artifact and return the created file id
    pub async fn upload_file(
        &self,
        credential: &CloudCredential,
        file_name: &str,
        artifact: &Artifact,
    ) -> Result<String> {
        let metadata = FileMetadata {
            name: file_name.to_string(),
            mime_type: artifact.mime_type.clone(),
        };

        let metadata_part = Part::text(serde_json::to_string(&metadata)?)
            .mime_str("application/json")
            .map_err(|e| CaptureError::internal(format!("Invalid metadata part: {}", e)))?;
        let media_part = Part::stream_with_length(
            reqwest::Body::from(artifact.data.clone()),
            artifact.len() as u64,
        )
        .file_name(file_name.to_string())
        .mime_str(&artifact.mime_type)
        .map_err(|e| CaptureError::internal(format!("Invalid media part: {}", e)))?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", media_part);

        let response = self
            .client
            .post(self.upload_endpoint())
            .bearer_auth(&credential.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CaptureError::network(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                body = %error_text,
                file_name = %file_name,
                "Drive upload rejected"
            );
            return Err(CaptureError::UploadFailed(status.as_u16()));
        }

        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| CaptureError::network(format!("Failed to parse upload response: {}", e)))?;

        tracing::info!(
            file_id = %file.id,
            size = artifact.len(),
            file_name = %file_name,
            "Successfully uploaded recording to Google Drive"
        );
        Ok(file.id)
    }

    pub async fn delete_file(&self, credential: &CloudCredential, file_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.file_endpoint(file_id))
            .bearer_auth(&credential.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CaptureError::DriveRequestFailed(response.status().as_u16()));
        }
        tracing::info!(file_id = %file_id, "Deleted file from Google Drive");
        Ok(())
    }

    pub async fn rename_file(
        &self,
        credential: &CloudCredential,
        file_id: &str,
        name: &str,
    ) -> Result<()> {
        let response = self
            .client
            .patch(self.file_endpoint(file_id))
            .bearer_auth(&credential.access_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CaptureError::DriveRequestFailed(response.status().as_u16()));
        }
        tracing::info!(file_id = %file_id, name = %name, "Renamed file on Google Drive");
        Ok(())
    }

    /// Check if the drive API answers at all
    pub async fn health_check(&self) -> bool {
        self.client
            .head(&self.config.api_url)
            .timeout(REACHABILITY_TIMEOUT)
            .send()
            .await
            .is_ok()
    }
}

impl RemoteStore for DriveClient {
    fn upload<'a>(
        &'a self,
        credential: &'a CloudCredential,
        file_name: &'a str,
        artifact: &'a Artifact,
    ) -> BoxFuture<'a, Result<String>> {
        self.upload_file(credential, file_name, artifact).boxed()
    }

    fn delete<'a>(&'a self, credential: &'a CloudCredential, file_id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.delete_file(credential, file_id).boxed()
    }

    fn rename<'a>(
        &'a self,
        credential: &'a CloudCredential,
        file_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        self.rename_file(credential, file_id, name).boxed()
    }

    fn is_reachable(&self) -> BoxFuture<'_, bool> {
        self.health_check().boxed()
    }
}
