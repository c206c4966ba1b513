//! Google Drive authorization
//!
//! - `credential`: the bearer credential and its two-scalar persistence
//! - `device_flow`: OAuth device authorization handshake
//!
//! `DriveAuthenticator` runs the handshake in the background so the control
//! API can hand the user code back immediately and report the outcome later.

mod credential;
mod device_flow;

pub use credential::{CloudCredential, CredentialStore, ACCESS_TOKEN_KEY, TOKEN_EXPIRY_KEY};
pub use device_flow::{classify_oauth_error, DeviceAuthorization, DeviceFlow, OAuthConfig};

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::clock::now_millis;
use crate::error::{CaptureError, Result};

/// Failure of the last authorization attempt, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFailure {
    pub code: String,
    pub message: String,
    pub remediation: Option<String>,
    pub retryable: bool,
}

impl From<&CaptureError> for AuthFailure {
    fn from(err: &CaptureError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            remediation: err.remediation().map(str::to_string),
            retryable: err.is_retryable() || matches!(err, CaptureError::InvalidOrigin(_)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub configured: bool,
    pub authenticated: bool,
    pub expires_at: Option<u64>,
    pub pending: Option<DeviceAuthorization>,
    pub last_error: Option<AuthFailure>,
}

/// The handshake currently owning the pending prompt.
///
/// `generation` changes whenever an attempt is started, abandoned or signed
/// out; a background task may only touch state or store its credential while
/// its own generation is still current.
#[derive(Default)]
struct AttemptState {
    generation: u64,
    pending: Option<DeviceAuthorization>,
    last_error: Option<AuthFailure>,
    task: Option<JoinHandle<()>>,
}

impl AttemptState {
    /// Abandons the running handshake, if any, and returns the next generation.
    fn supersede(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.pending = None;
        self.generation += 1;
        self.generation
    }
}

pub struct DriveAuthenticator {
    flow: Option<Arc<DeviceFlow>>,
    credentials: Arc<CredentialStore>,
    attempt: Arc<Mutex<AttemptState>>,
}

impl DriveAuthenticator {
    pub fn new(flow: Option<DeviceFlow>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            flow: flow.map(Arc::new),
            credentials,
            attempt: Arc::new(Mutex::new(AttemptState::default())),
        }
    }

    pub async fn status(&self) -> Result<AuthStatus> {
        let credential = self.credentials.valid_at(now_millis()).await?;
        let attempt = self.attempt.lock().await;

        Ok(AuthStatus {
            configured: self.flow.is_some(),
            authenticated: credential.is_some(),
            expires_at: credential.map(|c| c.expires_at),
            pending: attempt.pending.clone(),
            last_error: attempt.last_error.clone(),
        })
    }

    /// Starts a fresh handshake from the top and returns the consent prompt.
    /// Any handshake still waiting for consent is abandoned.
    pub async fn begin(&self) -> Result<DeviceAuthorization> {
        let flow = self.flow.clone().ok_or(CaptureError::AuthNotConfigured)?;
        let generation = self.attempt.lock().await.supersede();

        let authorization = match flow.begin().await {
            Ok(authorization) => authorization,
            Err(e) => {
                tracing::warn!(error = %e, "Google Drive authorization failed to start");
                let mut attempt = self.attempt.lock().await;
                if attempt.generation == generation {
                    attempt.last_error = Some(AuthFailure::from(&e));
                }
                return Err(e);
            }
        };

        let mut attempt = self.attempt.lock().await;
        if attempt.generation != generation {
            // Signed out or restarted while the prompt was being fetched.
            return Err(CaptureError::AuthInitFailed("authorization was cancelled".into()));
        }
        attempt.pending = Some(authorization.clone());
        attempt.last_error = None;
        attempt.task = Some(tokio::spawn(finish_attempt(
            flow,
            self.credentials.clone(),
            self.attempt.clone(),
            authorization.clone(),
            generation,
        )));

        Ok(authorization)
    }

    /// Clears the credential and abandons any handshake in flight.
    pub async fn sign_out(&self) -> Result<()> {
        let mut attempt = self.attempt.lock().await;
        attempt.supersede();
        attempt.last_error = None;
        // Cleared under the attempt lock so a granted handshake cannot race it.
        self.credentials.clear().await?;
        tracing::info!("Google Drive disconnected");
        Ok(())
    }
}

/// Waits for consent, then stores the credential if this attempt still owns
/// the state.
async fn finish_attempt(
    flow: Arc<DeviceFlow>,
    credentials: Arc<CredentialStore>,
    attempt: Arc<Mutex<AttemptState>>,
    authorization: DeviceAuthorization,
    generation: u64,
) {
    let outcome = flow.wait_for_grant(&authorization).await;

    let mut attempt = attempt.lock().await;
    if attempt.generation != generation {
        tracing::debug!("Discarding result of an abandoned Google Drive authorization");
        return;
    }
    attempt.pending = None;
    attempt.task = None;

    let saved = match outcome {
        Ok(credential) => credentials.save(&credential).await,
        Err(e) => Err(e),
    };
    match saved {
        Ok(()) => tracing::info!("Google Drive connected"),
        Err(e) => {
            tracing::warn!(error = %e, "Google Drive authorization failed");
            attempt.last_error = Some(AuthFailure::from(&e));
        }
    }
}
