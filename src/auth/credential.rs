use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::KvStore;

pub const ACCESS_TOKEN_KEY: &str = "drive-access-token";
pub const TOKEN_EXPIRY_KEY: &str = "drive-token-expiry";

/// Bearer credential for the drive API. There is no refresh token; once it
/// expires the authorization flow has to run again.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCredential {
    pub access_token: String,
    /// Absolute expiry, epoch milliseconds
    pub expires_at: u64,
}

impl CloudCredential {
    pub fn new(access_token: impl Into<String>, expires_at: u64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Credential granted at `now` for `expires_in_secs`
    pub fn from_lifetime(access_token: impl Into<String>, now: u64, expires_in_secs: u64) -> Self {
        Self::new(access_token, now.saturating_add(expires_in_secs.saturating_mul(1000)))
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        !self.access_token.is_empty() && now < self.expires_at
    }
}

impl std::fmt::Debug for CloudCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudCredential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Persists the credential as two scalars: the token and its expiry.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    kv: KvStore,
}

impl CredentialStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> Result<Option<CloudCredential>> {
        let token: Option<String> = self.kv.get(ACCESS_TOKEN_KEY).await?;
        let expiry: Option<u64> = self.kv.get(TOKEN_EXPIRY_KEY).await?;

        Ok(match (token, expiry) {
            (Some(token), Some(expires_at)) => Some(CloudCredential::new(token, expires_at)),
            _ => None,
        })
    }

    /// The stored credential, if it is still valid at `now`
    pub async fn valid_at(&self, now: u64) -> Result<Option<CloudCredential>> {
        Ok(self.load().await?.filter(|c| c.is_valid_at(now)))
    }

    pub async fn save(&self, credential: &CloudCredential) -> Result<()> {
        // Expiry first: a token without an expiry never loads.
        self.kv.put(TOKEN_EXPIRY_KEY, &credential.expires_at).await?;
        self.kv.put(ACCESS_TOKEN_KEY, &credential.access_token).await?;
        tracing::info!(expires_at = credential.expires_at, "Stored Google Drive credential");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.kv.remove(ACCESS_TOKEN_KEY).await?;
        self.kv.remove(TOKEN_EXPIRY_KEY).await?;
        Ok(())
    }
}
