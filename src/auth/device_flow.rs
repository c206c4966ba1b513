use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::credential::CloudCredential;
use crate::clock::now_millis;
use crate::error::{CaptureError, Result};

const DEFAULT_DEVICE_URL: &str = "https://oauth2.googleapis.com/device/code";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub device_url: String,
    pub token_url: String,
    pub scope: String,
}

impl OAuthConfig {
    /// Returns `None` when no client id is configured; drive auth is then unavailable.
    pub fn from_env() -> Option<Self> {
        let client_id = match std::env::var("GOOGLE_CLIENT_ID") {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return None,
        };

        Some(Self {
            client_id,
            client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok().filter(|s| !s.is_empty()),
            device_url: std::env::var("OAUTH_DEVICE_URL")
                .unwrap_or_else(|_| DEFAULT_DEVICE_URL.to_string()),
            token_url: std::env::var("OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            scope: DRIVE_FILE_SCOPE.to_string(),
        })
    }
}

/// What the user needs to see to grant consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthorization {
    #[serde(skip_serializing)]
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_uri")]
    verification_url: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Outcome of one poll of the token endpoint.
#[derive(Debug)]
enum PollOutcome {
    Granted(TokenResponse),
    Pending,
    SlowDown,
}

/// Maps a provider error code onto the two failure classes the UI distinguishes.
pub fn classify_oauth_error(code: &str, description: Option<&str>) -> CaptureError {
    let detail = match description {
        Some(d) if !d.is_empty() => format!("{}: {}", code, d),
        _ => code.to_string(),
    };

    match code {
        "invalid_client" | "unauthorized_client" | "origin_mismatch" | "redirect_uri_mismatch" => {
            CaptureError::InvalidOrigin(detail)
        }
        _ => CaptureError::AuthInitFailed(detail),
    }
}

/// OAuth 2.0 device authorization grant against Google.
///
/// `begin` asks for a user code; `wait_for_grant` polls until the user has
/// granted or refused consent. Storing the credential is up to the caller.
pub struct DeviceFlow {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl DeviceFlow {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CaptureError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub async fn begin(&self) -> Result<DeviceAuthorization> {
        let response = self
            .client
            .post(&self.config.device_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CaptureError::AuthInitFailed(format!("Device code request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| CaptureError::AuthInitFailed(format!("Invalid device code response: {}", e)))?;

        tracing::info!(
            user_code = %body.user_code,
            verification_url = %body.verification_url,
            "Waiting for Google Drive consent"
        );
        Ok(DeviceAuthorization {
            device_code: body.device_code,
            user_code: body.user_code,
            verification_url: body.verification_url,
            expires_in: body.expires_in,
            interval: body.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        })
    }

    /// Polls the token endpoint until the user answers. Nothing is persisted.
    pub async fn wait_for_grant(&self, authorization: &DeviceAuthorization) -> Result<CloudCredential> {
        let deadline = now_millis().saturating_add(authorization.expires_in.saturating_mul(1000));
        let mut interval = authorization.interval.max(1);

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if now_millis() >= deadline {
                return Err(CaptureError::AuthInitFailed("device code expired".into()));
            }

            match self.poll_token(&authorization.device_code).await? {
                PollOutcome::Granted(token) => {
                    return Ok(CloudCredential::from_lifetime(
                        token.access_token,
                        now_millis(),
                        token.expires_in,
                    ));
                }
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => {
                    interval += SLOW_DOWN_STEP_SECS;
                    tracing::debug!(interval_secs = interval, "Token endpoint asked to slow down");
                }
            }
        }
    }

    async fn poll_token(&self, device_code: &str) -> Result<PollOutcome> {
        let mut params = vec![
            ("client_id", self.config.client_id.as_str()),
            ("device_code", device_code),
            ("grant_type", DEVICE_GRANT_TYPE),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CaptureError::AuthInitFailed(format!("Token request failed: {}", e)))?;

        if response.status().is_success() {
            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| CaptureError::AuthInitFailed(format!("Invalid token response: {}", e)))?;
            return Ok(PollOutcome::Granted(token));
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(err) if err.error == "authorization_pending" => Ok(PollOutcome::Pending),
            Ok(err) if err.error == "slow_down" => Ok(PollOutcome::SlowDown),
            Ok(err) => Err(classify_oauth_error(&err.error, err.error_description.as_deref())),
            Err(_) => Err(CaptureError::AuthInitFailed(format!(
                "token endpoint returned {}",
                status
            ))),
        }
    }
}

async fn error_from_response(response: reqwest::Response) -> CaptureError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<OAuthErrorBody>(&body) {
        Ok(err) => classify_oauth_error(&err.error, err.error_description.as_deref()),
        Err(_) => CaptureError::AuthInitFailed(format!("provider returned {}", status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{oauth_config_for, FakeProvider};
    use std::net::SocketAddr;

    #[test]
    fn test_classify_unregistered_client() {
        let err = classify_oauth_error("invalid_client", Some("The OAuth client was not found."));
        assert!(matches!(err, CaptureError::InvalidOrigin(_)));
        assert!(err.to_string().contains("The OAuth client was not found."));

        assert!(matches!(
            classify_oauth_error("origin_mismatch", None),
            CaptureError::InvalidOrigin(_)
        ));
    }

    #[test]
    fn test_classify_generic_failure() {
        assert!(matches!(
            classify_oauth_error("access_denied", None),
            CaptureError::AuthInitFailed(_)
        ));
        assert!(matches!(
            classify_oauth_error("expired_token", Some("")),
            CaptureError::AuthInitFailed(_)
        ));
    }

    #[test]
    fn test_device_code_response_accepts_rfc_field_name() {
        let json = r#"{
            "device_code": "dev",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://www.google.com/device",
            "expires_in": 1800
        }"#;
        let body: DeviceCodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.verification_url, "https://www.google.com/device");
        assert_eq!(body.interval, None);
    }

    #[test]
    fn test_authorization_hides_device_code() {
        let authorization = DeviceAuthorization {
            device_code: "secret-device-code".into(),
            user_code: "ABCD".into(),
            verification_url: "https://www.google.com/device".into(),
            expires_in: 1800,
            interval: 5,
        };
        let json = serde_json::to_string(&authorization).unwrap();
        assert!(!json.contains("secret-device-code"));
        assert!(json.contains("userCode"));
    }

    fn flow_for(addr: SocketAddr) -> DeviceFlow {
        DeviceFlow::new(oauth_config_for(addr)).unwrap()
    }

    #[tokio::test]
    async fn test_grant_arrives_after_pending() {
        let flow = flow_for(FakeProvider::granting(1).spawn());

        let authorization = flow.begin().await.unwrap();
        assert_eq!(authorization.user_code, "WXYZ-1234");
        assert_eq!(authorization.interval, 1);

        let credential = flow.wait_for_grant(&authorization).await.unwrap();
        assert_eq!(credential.access_token, "ya29.granted");
        assert!(credential.is_valid_at(now_millis()));
    }

    #[tokio::test]
    async fn test_denied_consent_is_generic_failure() {
        let flow = flow_for(FakeProvider::denying_token("access_denied").spawn());
        let authorization = flow.begin().await.unwrap();

        let err = flow.wait_for_grant(&authorization).await.unwrap_err();
        assert!(matches!(err, CaptureError::AuthInitFailed(_)));
        assert!(err.to_string().contains("access_denied"));
    }

    #[tokio::test]
    async fn test_unregistered_client_is_invalid_origin() {
        let flow = flow_for(FakeProvider::rejecting_device("invalid_client").spawn());

        let err = flow.begin().await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidOrigin(_)));
        assert!(err.remediation().is_some());
    }
}
