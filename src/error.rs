use serde_json::Value;
use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No image selected or the image is empty")]
    EmptyAsset,
    #[error("Failed to read image {0}: {1}")]
    EncodingFailed(String, #[source] std::io::Error),
    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error(
        "Request failed{}: {message}",
        .status.map(|code| format!(" with status {}", code)).unwrap_or_default()
    )]
    Transport { status: Option<u16>, message: String },
    #[error("Unrecognized response shape ({reason}): {value}")]
    UnrecognizedResponseShape { reason: String, value: Value },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to write {0}: {1}")]
    Output(String, #[source] std::io::Error),
    #[error("The session task has stopped")]
    SessionClosed,
}

impl AppError {
    pub fn unrecognized(reason: impl Into<String>, value: &Value) -> Self {
        AppError::UnrecognizedResponseShape {
            reason: reason.into(),
            value: value.clone(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyAsset,
    EncodingFailed,
    InvalidParameter,
    Transport,
    UnrecognizedResponseShape,
    Config,
    Output,
    SessionClosed,
}

/// Cloneable snapshot of an [`AppError`], carried by `SessionState::Failed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl From<&AppError> for ErrorInfo {
    fn from(error: &AppError) -> Self {
        let (kind, status) = match error {
            AppError::EmptyAsset => (ErrorKind::EmptyAsset, None),
            AppError::EncodingFailed(..) => (ErrorKind::EncodingFailed, None),
            AppError::InvalidParameter { .. } => (ErrorKind::InvalidParameter, None),
            AppError::Transport { status, .. } => (ErrorKind::Transport, *status),
            AppError::UnrecognizedResponseShape { .. } => {
                (ErrorKind::UnrecognizedResponseShape, None)
            }
            AppError::Config(_) => (ErrorKind::Config, None),
            AppError::Output(..) => (ErrorKind::Output, None),
            AppError::SessionClosed => (ErrorKind::SessionClosed, None),
        };
        Self {
            kind,
            status,
            message: error.to_string(),
        }
    }
}

impl From<AppError> for ErrorInfo {
    fn from(error: AppError) -> Self {
        ErrorInfo::from(&error)
    }
}
