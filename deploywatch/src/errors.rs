//! Error types for the deployment observer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the deployment observer
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No task identifier provided")]
    MissingIdentifier,

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ObserverError {
    /// Collapse into the error kind reported to view collaborators
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObserverError::MissingIdentifier => ErrorKind::MissingIdentifier,
            ObserverError::NotFound(_) => ErrorKind::TaskNotFound,
            ObserverError::DecodeError(_) | ObserverError::JsonError(_) => {
                ErrorKind::DecodeAmbiguous
            }
            _ => ErrorKind::TransportError,
        }
    }
}

impl From<anyhow::Error> for ObserverError {
    fn from(err: anyhow::Error) -> Self {
        ObserverError::Internal(err.to_string())
    }
}

/// Error kinds surfaced through the view state.
///
/// Nothing past the controller boundary sees an `ObserverError`; it is
/// reduced to one of these and stored in `ViewState::error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No task identifier was supplied to `start`
    MissingIdentifier,

    /// Channel or request level network failure
    TransportError,

    /// The backend has no task for the requested identifier
    TaskNotFound,

    /// A frame matched neither wire shape (never shown to users)
    DecodeAmbiguous,
}

impl ErrorKind {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::MissingIdentifier => "No task ID provided",
            ErrorKind::TransportError => "Lost connection to log stream.",
            ErrorKind::TaskNotFound => {
                "No backend task found for this project. The project may not be deployed yet."
            }
            ErrorKind::DecodeAmbiguous => "Received an unreadable log frame.",
        }
    }

    /// Whether a user ever gets to see this kind
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ErrorKind::DecodeAmbiguous)
    }
}
