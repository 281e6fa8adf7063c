//! Error types for the backend collaborators.
//!
//! None of these reach the chat transcript as-is: the session turns gateway
//! failures into a fallback reply and directory failures into an empty list.

use thiserror::Error;

/// Failure of a single inference request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed gateway response: {0}")]
    MalformedBody(String),
}

/// Failure to fetch the list of selectable contexts.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Context directory request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Context directory returned HTTP {0}")]
    Status(u16),

    #[error("Unexpected context directory payload: {0}")]
    Malformed(String),
}

/// Failure to submit documents for embedding.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload is invalid: {0}")]
    Invalid(String),

    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upload rejected with HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Could not encode upload manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// HTTP status reported by the backend, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::MalformedBody(_) => None,
        }
    }
}
