use thiserror::Error;

use crate::reference::ReferenceError;

/// Failures raised by the channel transport and the continuation engine.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The channel refused the bot's identity, or the target is unknown or stale.
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        retryable: bool,
        #[source]
        source: Option<reqwest::Error>,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("failed to encode activity")]
    Codec(#[from] serde_json::Error),
}

impl AdapterError {
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied(message.into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            status,
            message: message.into(),
            retryable,
            source: None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }
}

impl From<ReferenceError> for AdapterError {
    fn from(err: ReferenceError) -> Self {
        Self::AccessDenied(err.to_string())
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
            retryable: true,
            source: Some(err),
        }
    }
}
