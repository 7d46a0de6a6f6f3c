//! Errors surfaced by the inference backend

use thiserror::Error;

/// Failure talking to the inference backend.
///
/// `Unavailable` and `Status` both mean the backend could not serve the
/// request; callers that only care about that distinction use
/// [`BackendError::is_unavailable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection refused, DNS failure, timeout, or a broken body stream
    #[error("inference backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with a non-success HTTP status
    #[error("inference backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered 2xx but the body could not be decoded
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// The transport was shut down with `close()`
    #[error("inference transport is closed")]
    Closed,
}

impl BackendError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Status { .. })
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
