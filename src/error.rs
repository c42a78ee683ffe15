//! Error types for BandHub

use std::io;
use thiserror::Error;

/// Result type alias for BandHub operations
pub type Result<T> = std::result::Result<T, BandHubError>;

/// Custom error types for BandHub
#[derive(Error, Debug)]
pub enum BandHubError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed stream: {0}")]
    MalformedStream(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl BandHubError {
    /// Errors whose detail stays in the server log instead of going to the client.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BandHubError::Io(_)
                | BandHubError::Serialization(_)
                | BandHubError::Persistence(_)
                | BandHubError::Server(_)
        )
    }
}

impl From<rusqlite::Error> for BandHubError {
    fn from(err: rusqlite::Error) -> Self {
        BandHubError::Persistence(err.to_string())
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for BandHubError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        BandHubError::MalformedStream(format!("Frame parse error: {:?}", err))
    }
}
