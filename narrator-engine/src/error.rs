//! Error types for narrator-engine
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Backend failures are recovered inside the engine; only
//! `InvalidRequest` ever reaches a `play` caller.

use narrator_common::events::ErrorCode;
use thiserror::Error;

/// Main error type for narrator-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Payload could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Backend refused to start without a user gesture
    #[error("Autoplay rejected: {0}")]
    AutoplayRejected(String),

    /// Backend not usable right now (e.g. decode context suspended)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// TTS service request failed
    #[error("Network error: {0}")]
    Network(String),

    /// Empty text or sentences
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Ambient video output errors
    #[error("Video error: {0}")]
    Video(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Taxonomy code reported in `NarrationError` events
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Decode(_) | Error::BackendUnavailable(_) => Some(ErrorCode::DecodeFailure),
            Error::AutoplayRejected(_) => Some(ErrorCode::AutoplayRejected),
            Error::Network(_) => Some(ErrorCode::NetworkFailure),
            Error::InvalidRequest(_) => Some(ErrorCode::InvalidRequest),
            _ => None,
        }
    }
}

impl From<narrator_common::Error> for Error {
    fn from(e: narrator_common::Error) -> Self {
        match e {
            narrator_common::Error::Io(io) => Error::Io(io),
            narrator_common::Error::Config(msg) => Error::Config(msg),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

/// Convenience Result type using narrator-engine Error
pub type Result<T> = std::result::Result<T, Error>;
