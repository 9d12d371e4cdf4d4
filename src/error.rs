//! Error types for the director service.

use thiserror::Error;
use uuid::Uuid;

/// Failure of one call to an external collaborator (text generation,
/// captioning, retrieval). These never escape a turn; the controller
/// degrades them to neutral defaults.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CollaboratorError::Timeout { .. } => true,
            CollaboratorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CollaboratorError::Status { status, .. } => *status == 429 || *status >= 500,
            CollaboratorError::Parse { .. }
            | CollaboratorError::Unavailable { .. }
            | CollaboratorError::Io(_) => false,
        }
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Parse {
            message: err.to_string(),
        }
    }
}

/// Invalid startup configuration. Fatal: the service refuses to start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must not be empty")]
    Empty { key: &'static str },

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown session {0}")]
    NotFound(Uuid),

    #[error("Reference images must be uploaded, not given as a server path")]
    ClientImagePath,

    #[error("Unsupported image {0:?}: expected png, jpg, jpeg, webp, gif or bmp")]
    UnsupportedImage(String),

    #[error("Uploaded image is empty")]
    EmptyImage,

    #[error("Failed to store uploaded image: {0}")]
    Storage(String),
}
