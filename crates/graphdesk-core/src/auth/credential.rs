use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::AuthError;

/// Buffer before expiry at which a cached token is no longer handed out
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: String, expires_on: DateTime<Utc>) -> Self {
        Self { token, expires_on }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_on
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        Utc::now() + Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES) >= self.expires_on
    }
}

/// What the user needs to complete a device-code sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub verification_uri: String,
    /// Ready-to-display instructions from the identity provider
    pub message: String,
    pub expires_in: u64,
}

/// Callback used to show [`DeviceCodeInfo`] to the user.
pub type DeviceCodePrompt = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

/// Source of bearer tokens for a set of scopes.
///
/// Implementations own caching and refresh; callers simply ask again.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError>;
}
