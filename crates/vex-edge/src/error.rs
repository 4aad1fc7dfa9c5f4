//! Error types for the vex-edge crate.

use thiserror::Error;

use crate::types::ApiMessage;

/// Errors returned by edge store operations.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    /// The request never produced an HTTP response.
    #[error("Edge request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success HTTP status.
    #[error("Edge API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The API answered but reported `success=false`.
    #[error("Edge API rejected the request: errors={errors:?} messages={messages:?}")]
    Rejected {
        errors: Vec<ApiMessage>,
        messages: Vec<ApiMessage>,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode edge API response: {0}")]
    Decode(String),
}

impl EdgeError {
    /// Returns true if a later attempt might succeed without any change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            EdgeError::Transport { .. } => true,
            EdgeError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type for edge operations.
pub type EdgeResult<T> = Result<T, EdgeError>;
