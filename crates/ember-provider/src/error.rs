//! Provider call errors.

use thiserror::Error;

/// Result type alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by a compute provider implementation.
///
/// `Transport` and 5xx/429 `Api` errors are transient and safe to retry;
/// everything else reflects a rejected request and is terminal. An error
/// carried inside a DONE [`Operation`](crate::types::Operation) is not a
/// `ProviderError`: the call itself succeeded, and the operation poller
/// handles the payload.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// True when retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}
