use thiserror::Error;

/// Custom error types for the capture daemon
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture errors
    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device or encoder failure: {0}")]
    PlatformCapture(String),

    /// Save errors
    #[error("Not authenticated with Google Drive")]
    NotAuthenticated,

    #[error("Upload failed with status {0}")]
    UploadFailed(u16),

    #[error("Drive request failed with status {0}")]
    DriveRequestFailed(u16),

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("There is no stopped recording to save")]
    NothingToSave,

    #[error("Invalid recording name: {0}")]
    InvalidName(String),

    #[error("Recording {0} not found")]
    RecordingNotFound(String),

    /// Authorization errors
    #[error("Authorization failed: {0}")]
    AuthInitFailed(String),

    #[error("This client is not registered with the provider: {0}")]
    InvalidOrigin(String),

    #[error("Google Drive authorization is not configured")]
    AuthNotConfigured,

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Failed to serialize data: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Network errors
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigurationParseFailed(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using CaptureError
pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        CaptureError::Internal(msg.into())
    }

    /// Helper to create platform capture errors
    pub fn platform(msg: impl Into<String>) -> Self {
        CaptureError::PlatformCapture(msg.into())
    }

    /// Helper to create network errors
    pub fn network(msg: impl Into<String>) -> Self {
        CaptureError::NetworkError(msg.into())
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied(_) => "PERMISSION_DENIED",
            CaptureError::PlatformCapture(_) => "PLATFORM_CAPTURE_ERROR",
            CaptureError::NotAuthenticated => "NOT_AUTHENTICATED",
            CaptureError::UploadFailed(_) => "UPLOAD_FAILED",
            CaptureError::DriveRequestFailed(_) => "DRIVE_REQUEST_FAILED",
            CaptureError::SaveInProgress => "SAVE_IN_PROGRESS",
            CaptureError::NothingToSave => "NOTHING_TO_SAVE",
            CaptureError::InvalidName(_) => "INVALID_NAME",
            CaptureError::RecordingNotFound(_) => "RECORDING_NOT_FOUND",
            CaptureError::AuthInitFailed(_) => "AUTH_INIT_FAILED",
            CaptureError::InvalidOrigin(_) => "INVALID_ORIGIN",
            CaptureError::AuthNotConfigured => "AUTH_NOT_CONFIGURED",
            CaptureError::Storage(_) => "STORAGE_ERROR",
            CaptureError::SerializationFailed(_) => "SERIALIZATION_ERROR",
            CaptureError::NetworkError(_) => "NETWORK_ERROR",
            CaptureError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            CaptureError::ConfigurationParseFailed(_) => "CONFIGURATION_PARSE_FAILED",
            CaptureError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used when the error crosses the control API
    pub fn status_code(&self) -> u16 {
        match self {
            CaptureError::PermissionDenied(_) => 403,
            CaptureError::NotAuthenticated => 401,
            CaptureError::SaveInProgress | CaptureError::NothingToSave => 409,
            CaptureError::InvalidName(_) => 400,
            CaptureError::RecordingNotFound(_) => 404,
            CaptureError::UploadFailed(_)
            | CaptureError::DriveRequestFailed(_)
            | CaptureError::NetworkError(_) => 502,
            CaptureError::AuthInitFailed(_) | CaptureError::InvalidOrigin(_) => 502,
            CaptureError::AuthNotConfigured => 503,
            _ => 500,
        }
    }

    /// Whether the user can simply try the same operation again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::UploadFailed(_)
                | CaptureError::NetworkError(_)
                | CaptureError::AuthInitFailed(_)
                | CaptureError::SaveInProgress
        )
    }

    /// Instructions shown to the user alongside the error, when there is something to do
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            CaptureError::InvalidOrigin(_) => Some(
                "Register this OAuth client in the Google Cloud console as a \
                 \"TVs and Limited Input devices\" client, enable the Drive API \
                 for its project, then set GOOGLE_CLIENT_ID and try again.",
            ),
            CaptureError::AuthInitFailed(_) => Some("Try connecting to Google Drive again."),
            CaptureError::UploadFailed(_) => {
                Some("The recording is still available. Retry the save or save it locally.")
            }
            CaptureError::PermissionDenied(_) => {
                Some("Allow screen and microphone access for this application, then start again.")
            }
            CaptureError::AuthNotConfigured => Some("Set GOOGLE_CLIENT_ID to enable Google Drive."),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        CaptureError::NetworkError(err.to_string())
    }
}
