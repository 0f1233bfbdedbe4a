use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No scopes were requested")]
    NoScopes,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Identity provider error: {error} - {error_description}")]
    ServerError {
        error: String,
        error_description: String,
    },

    #[error("Device code expired before sign-in completed")]
    AuthorizationExpired,

    #[error("Sign-in was declined")]
    AccessDenied,

    #[error("Timed out waiting for sign-in")]
    Timeout,

    #[error("Invalid response from identity provider: {0}")]
    InvalidResponse(String),
}
