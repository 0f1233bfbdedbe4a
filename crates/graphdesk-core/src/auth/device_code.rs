//! OAuth 2.0 device authorization grant (RFC 8628) against the Microsoft
//! identity platform v2.0 endpoints.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{AccessToken, AuthError, DeviceCodeInfo, DeviceCodePrompt, TokenCredential, TokenStore};

// ============================================================================
// Constants
// ============================================================================

/// Default identity platform authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Requested alongside the app's scopes so the token endpoint issues a refresh token
const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Poll interval used when the device code response omits one
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Extra wait added when the token endpoint answers `slow_down`
const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn into_auth_error(self) -> AuthError {
        AuthError::ServerError {
            error: self.error,
            error_description: self.error_description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access: AccessToken,
    refresh_token: Option<String>,
}

impl CachedToken {
    fn from_response(response: TokenResponse) -> Self {
        let expires_on = Utc::now() + chrono::Duration::seconds(response.expires_in as i64);
        Self {
            access: AccessToken::new(response.access_token, expires_on),
            refresh_token: response.refresh_token,
        }
    }
}

/// Interactive credential: the first token request shows a device code via
/// the prompt callback and waits for the user to sign in; later requests are
/// served from the cache or silently refreshed.
pub struct DeviceCodeCredential {
    client: Client,
    client_id: String,
    tenant_id: String,
    authority: String,
    prompt: DeviceCodePrompt,
    // Holding the lock across the interactive flow keeps concurrent callers
    // from starting a second sign-in.
    cache: Mutex<HashMap<String, CachedToken>>,
    store: Option<TokenStore>,
}

impl DeviceCodeCredential {
    pub fn new(client_id: &str, tenant_id: &str, prompt: DeviceCodePrompt) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            tenant_id: tenant_id.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            prompt,
            cache: Mutex::new(HashMap::new()),
            store: None,
        })
    }

    /// Point the credential at a different authority host
    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    /// Persist refresh tokens so later processes can skip the prompt
    pub fn with_token_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", self.authority, self.tenant_id, name)
    }

    /// Cache key: scope order and case do not change what a token grants
    fn scope_key(scopes: &[String]) -> String {
        let mut normalized: Vec<String> = scopes.iter().map(|s| s.to_lowercase()).collect();
        normalized.sort();
        normalized.dedup();
        normalized.join(" ")
    }

    fn scope_param(scopes: &[String]) -> String {
        let mut requested: Vec<&str> = scopes.iter().map(String::as_str).collect();
        if !requested.iter().any(|s| s.eq_ignore_ascii_case(OFFLINE_ACCESS_SCOPE)) {
            requested.push(OFFLINE_ACCESS_SCOPE);
        }
        requested.join(" ")
    }

    async fn read_error(response: reqwest::Response) -> ErrorResponse {
        let status = response.status();
        response.json::<ErrorResponse>().await.unwrap_or_else(|_| ErrorResponse {
            error: "unknown_error".to_string(),
            error_description: Some(format!("Unexpected status {}", status)),
        })
    }

    async fn start_device_flow(&self, scopes: &[String]) -> Result<DeviceCodeResponse, AuthError> {
        let scope = Self::scope_param(scopes);
        let response = self
            .client
            .post(self.endpoint("devicecode"))
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            response
                .json::<DeviceCodeResponse>()
                .await
                .map_err(|e| AuthError::InvalidResponse(format!("device code response: {}", e)))
        } else {
            Err(Self::read_error(response).await.into_auth_error())
        }
    }

    async fn poll_for_token(&self, device: &DeviceCodeResponse) -> Result<TokenResponse, AuthError> {
        let mut interval = Duration::from_secs(device.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS));
        let expires_in = Duration::from_secs(device.expires_in);
        let token_endpoint = self.endpoint("token");

        let polling = async {
            loop {
                sleep(interval).await;

                let response = self
                    .client
                    .post(&token_endpoint)
                    .form(&[
                        ("grant_type", DEVICE_CODE_GRANT),
                        ("client_id", self.client_id.as_str()),
                        ("device_code", device.device_code.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(AuthError::from)?;

                if response.status().is_success() {
                    return response
                        .json::<TokenResponse>()
                        .await
                        .map_err(|e| AuthError::InvalidResponse(format!("token response: {}", e)));
                }

                let error = Self::read_error(response).await;
                match error.error.as_str() {
                    "authorization_pending" => continue,
                    "slow_down" => {
                        interval += Duration::from_secs(SLOW_DOWN_INCREMENT_SECS);
                        debug!(interval_secs = interval.as_secs(), "Token endpoint asked to slow down");
                    }
                    "expired_token" => return Err(AuthError::AuthorizationExpired),
                    "access_denied" | "authorization_declined" => return Err(AuthError::AccessDenied),
                    _ => return Err(error.into_auth_error()),
                }
            }
        };

        timeout(expires_in, polling).await.map_err(|_| AuthError::Timeout)?
    }

    async fn interactive_sign_in(&self, scopes: &[String]) -> Result<TokenResponse, AuthError> {
        let device = self.start_device_flow(scopes).await?;

        let message = device.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                device.verification_uri, device.user_code
            )
        });
        (self.prompt)(&DeviceCodeInfo {
            user_code: device.user_code.clone(),
            verification_uri: device.verification_uri.clone(),
            message,
            expires_in: device.expires_in,
        });

        let token = self.poll_for_token(&device).await?;
        info!(tenant = %self.tenant_id, "Device code sign-in completed");
        Ok(token)
    }

    async fn redeem_refresh_token(&self, refresh_token: &str, scopes: &[String]) -> Result<TokenResponse, AuthError> {
        let scope = Self::scope_param(scopes);
        let response = self
            .client
            .post(self.endpoint("token"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            response
                .json::<TokenResponse>()
                .await
                .map_err(|e| AuthError::InvalidResponse(format!("token response: {}", e)))
        } else {
            Err(Self::read_error(response).await.into_auth_error())
        }
    }

    // Keychain backends make blocking IPC calls, so they run off the async workers
    async fn stored_refresh_token(&self) -> Option<String> {
        let store = self.store.clone()?;
        match spawn_blocking(move || store.load()).await {
            Ok(Ok(token)) => Some(token),
            Ok(Err(e)) => {
                debug!(error = %e, "No stored refresh token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Keychain lookup task failed");
                None
            }
        }
    }

    async fn persist(&self, cached: &CachedToken) {
        let (Some(store), Some(refresh_token)) = (self.store.clone(), cached.refresh_token.clone()) else {
            return;
        };
        match spawn_blocking(move || store.save(&refresh_token)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist refresh token"),
            Err(e) => warn!(error = %e, "Keychain save task failed"),
        }
    }
}

#[async_trait]
impl TokenCredential for DeviceCodeCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        if scopes.is_empty() {
            return Err(AuthError::NoScopes);
        }

        let key = Self::scope_key(scopes);
        let mut cache = self.cache.lock().await;

        let previous = cache.get(&key).cloned();
        if let Some(cached) = &previous {
            if !cached.access.needs_refresh() {
                return Ok(cached.access.clone());
            }
        }

        let refresh_token = match previous.and_then(|c| c.refresh_token) {
            Some(token) => Some(token),
            None => self.stored_refresh_token().await,
        };

        if let Some(refresh_token) = refresh_token {
            match self.redeem_refresh_token(&refresh_token, scopes).await {
                Ok(response) => {
                    debug!(scopes = %key, "Refreshed access token");
                    let mut refreshed = CachedToken::from_response(response);
                    // Keep the old refresh token when the server does not rotate it
                    if refreshed.refresh_token.is_none() {
                        refreshed.refresh_token = Some(refresh_token);
                    }
                    self.persist(&refreshed).await;
                    let access = refreshed.access.clone();
                    cache.insert(key, refreshed);
                    return Ok(access);
                }
                Err(e) => warn!(error = %e, "Refresh failed, falling back to device code sign-in"),
            }
        }

        let fresh = CachedToken::from_response(self.interactive_sign_in(scopes).await?);
        self.persist(&fresh).await;
        let access = fresh.access.clone();
        cache.insert(key, fresh);
        Ok(access)
    }
}
