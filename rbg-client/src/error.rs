//! Error types for rbg-client
//!
//! Client-detectable preconditions (`NoSession`, `NotReady`, `InvalidArtifact`)
//! are raised before any network call. Backend-reported failures are carried
//! verbatim and never retried automatically.

use thiserror::Error;

/// Main error type for rbg-client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network failure talking to the backend (connect, timeout, broken body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Analysis requested before the backend reported readiness
    #[error("Backend not ready for analysis")]
    NotReady,

    /// Analysis requested with no uploaded image bound
    #[error("No session bound: upload an image first")]
    NoSession,

    /// Backend declared its initialization failed
    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    /// Backend declared an analysis run failed
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// Upload payload rejected client-side (empty, not an image)
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Backend answered with a non-success HTTP status
    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Backend response could not be decoded
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// Client core stopped
    #[error("Client shut down")]
    Shutdown,

    /// rbg-common error
    #[error(transparent)]
    Common(#[from] rbg_common::Error),
}

impl ClientError {
    /// Precondition failures detected without contacting the backend
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::NotReady | ClientError::NoSession | ClientError::InvalidArtifact(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// Convenience Result type using ClientError
pub type ClientResult<T> = std::result::Result<T, ClientError>;
