//! Error types for the datebook client.

use thiserror::Error;

/// Errors that can occur in datebook operations.
#[derive(Error, Debug)]
pub enum DatebookError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An error occurred, please try again later")]
    ServerError,

    #[error("Failed to sign up")]
    SignupFailed,

    #[error("Authentication request failed: {0}")]
    AuthRequestFailed(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Request failed with status {0}")]
    RequestFailed(reqwest::StatusCode),

    #[error("Could not decode access token: {0}")]
    TokenDecodeFailed(String),

    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("Events need a title")]
    MissingTitle,

    #[error("Event has no id")]
    MissingEventId,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DatebookError {
    fn from(err: serde_json::Error) -> Self {
        DatebookError::Serialization(err.to_string())
    }
}

/// Result type alias for datebook operations.
pub type DatebookResult<T> = Result<T, DatebookError>;
