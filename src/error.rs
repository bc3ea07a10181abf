//! Error types for mock-interview
//!
//! Each collaborator gets its own error enum so callers can tell an ingestion problem
//! from a session-establishment problem. `SessionErrorKind` is the serializable taxonomy
//! surfaced to the presentation layer through `SessionSnapshot::last_error`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::session::ConnectionState;

/// Errors raised by the ingestion client
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("{0} is empty")]
    EmptyInput(&'static str),

    #[error("Only PDF files are supported: {0}")]
    UnsupportedFile(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response; `message` is the service's `detail` when it sent one
    #[error("{message}")]
    Service { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors raised by the credential client
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential request failed: {0}")]
    Network(String),

    #[error("Credential service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The service answered 2xx but the body could not be decoded
    #[error("Malformed credential response: {0}")]
    Malformed(String),

    /// Decoded, but missing the endpoint or token
    #[error("Invalid credential: {0}")]
    Invalid(String),
}

/// Errors raised by a realtime transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Microphone error: {0}")]
    Microphone(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Failed to attach track: {0}")]
    Attach(String),

    #[error("Connection closed")]
    Closed,
}

/// Failure categories reported to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionErrorKind {
    IngestionFailed,
    CredentialRequestFailed,
    InvalidCredential,
    ConnectionFailed,
    MicrophonePublishFailed,
    UnexpectedDisconnect,
}

/// Rejections returned directly to the caller of a session intent.
///
/// None of these change the session state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No job listing has been provided")]
    MissingJobListing,

    #[error("No resume has been provided")]
    MissingResume,

    #[error("A session is already in progress ({0:?})")]
    AlreadyActive(ConnectionState),

    #[error("Session is not connected ({0:?})")]
    NotConnected(ConnectionState),

    #[error("Cannot {operation} while {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("Failed to change microphone state: {0}")]
    Microphone(String),

    #[error("Session controller has shut down")]
    ControllerClosed,
}

impl From<&IngestionError> for SessionErrorKind {
    fn from(_: &IngestionError) -> Self {
        SessionErrorKind::IngestionFailed
    }
}

impl From<&CredentialError> for SessionErrorKind {
    fn from(err: &CredentialError) -> Self {
        match err {
            CredentialError::Malformed(_) | CredentialError::Invalid(_) => {
                SessionErrorKind::InvalidCredential
            }
            CredentialError::Network(_) | CredentialError::Status { .. } => {
                SessionErrorKind::CredentialRequestFailed
            }
        }
    }
}
