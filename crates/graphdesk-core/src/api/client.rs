//! HTTP transport for Microsoft Graph.
//!
//! `HttpTransport` executes [`GraphRequest`]s with reqwest, authenticating
//! every call with a bearer token pulled from a [`TokenCredential`] for the
//! configured scopes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, GraphRequest, GraphTransport, Method};
use crate::auth::TokenCredential;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for Graph v1.0 endpoints
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for a CLI.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on a server-provided Retry-After, in seconds
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Graph client over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
    initial_backoff: Duration,
}

impl HttpTransport {
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: GRAPH_BASE_URL.to_string(),
            credential,
            scopes,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
    }

    /// Decode a successful response; 202/204 and empty bodies yield `None`
    async fn read_body(response: reqwest::Response) -> Result<Option<Value>, ApiError> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl GraphTransport for HttpTransport {
    async fn perform(&self, request: &GraphRequest) -> Result<Option<Value>, ApiError> {
        let url = request.url(&self.base_url)?;
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            // Asked every attempt: the credential serves its cache and refreshes near expiry
            let token = self.credential.get_token(&self.scopes).await?;

            let builder = match request.method {
                Method::Get => self.client.get(url.clone()),
                Method::Post => {
                    let builder = self.client.post(url.clone());
                    match &request.body {
                        Some(body) => builder.json(body),
                        None => builder.header(header::CONTENT_LENGTH, 0),
                    }
                }
            };

            debug!(method = ?request.method, path = %request.path, "Sending Graph request");
            let response = builder
                .bearer_auth(&token.token)
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Self::read_body(response).await;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                let wait = Self::retry_after(&response).unwrap_or(backoff);
                warn!(
                    path = %request.path,
                    retry = retries,
                    backoff_ms = wait.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Direction;
    use crate::auth::{AccessToken, AuthError};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticCredential;

    #[async_trait]
    impl TokenCredential for StaticCredential {
        async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
            if scopes.is_empty() {
                return Err(AuthError::NoScopes);
            }
            Ok(AccessToken::new("test-token".into(), Utc::now() + ChronoDuration::hours(1)))
        }
    }

    fn transport(server: &MockServer, scopes: &[&str]) -> HttpTransport {
        HttpTransport::new(
            Arc::new(StaticCredential),
            scopes.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
        .with_base_url(&format!("{}/v1.0", server.uri()))
        .with_initial_backoff(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/mailFolders/inbox/messages"))
            .and(header_is("authorization", "Bearer test-token"))
            .and(query_param("$select", "from,isRead,receivedDateTime,subject"))
            .and(query_param("$top", "25"))
            .and(query_param("$orderby", "receivedDateTime DESC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GraphRequest::get("/me/mailFolders/inbox/messages")
            .select(&["from", "isRead", "receivedDateTime", "subject"])
            .top(25)
            .order_by("receivedDateTime", Direction::Descending);

        let body = transport(&server, &["mail.read"]).perform(&request).await.unwrap();
        assert_eq!(body, Some(json!({ "value": [] })));
    }

    #[tokio::test]
    async fn test_post_accepted_without_body_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/me/sendMail"))
            .and(body_json(json!({ "message": { "subject": "Hi" } })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let request = GraphRequest::post("me/sendMail", &json!({ "message": { "subject": "Hi" } })).unwrap();
        let body = transport(&server, &["mail.send"]).perform(&request).await.unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_graph_error_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges" }
            })))
            .mount(&server)
            .await;

        let err = transport(&server, &["user.read"])
            .perform(&GraphRequest::get("/me"))
            .await
            .unwrap_err();
        match err {
            ApiError::AccessDenied(detail) => assert!(detail.contains("Insufficient privileges")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "displayName": "Megan" })))
            .mount(&server)
            .await;

        let body = transport(&server, &["user.read"])
            .perform(&GraphRequest::get("/me"))
            .await
            .unwrap();
        assert_eq!(body.unwrap()["displayName"], "Megan");
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(ResponseTemplate::new(429))
            .expect(u64::from(MAX_RATE_LIMIT_RETRIES) + 1)
            .mount(&server)
            .await;

        let err = transport(&server, &["user.read"])
            .perform(&GraphRequest::get("/me"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));
    }

    #[tokio::test]
    async fn test_credential_failure_stops_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = transport(&server, &[])
            .perform(&GraphRequest::get("/me"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::NoScopes)));
    }
}
