use thiserror::Error;

use crate::api::ApiError;
use crate::auth::AuthError;

/// Broad classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid settings, detected before any network call.
    Config,
    /// An operation was invoked before the session was initialized.
    State,
    /// The identity provider or Graph rejected the call or could not be reached.
    Remote,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Config(String),

    #[error("Graph has not been initialized for user auth")]
    NotInitialized,

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Error calling Graph: {0}")]
    Remote(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Config(_) => ErrorKind::Config,
            SessionError::NotInitialized => ErrorKind::State,
            SessionError::Auth(AuthError::NoScopes)
            | SessionError::Api(ApiError::Auth(AuthError::NoScopes)) => ErrorKind::Config,
            SessionError::Auth(_) | SessionError::Api(_) | SessionError::Remote(_) => {
                ErrorKind::Remote
            }
        }
    }
}
