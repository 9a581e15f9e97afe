//! Error types for DeployKit.
//!
//! A single error enum covers the display protocol, process supervision and
//! process introspection so callers can match on one type.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the DeployKit library.
#[derive(Debug, Error)]
pub enum DeployError {
    // Display protocol errors
    #[error("Display channel fault: {message}")]
    ChannelFault { message: String },

    #[error("Display client error: {message}")]
    Remote { message: String },

    #[error("Display handshake failed: {message}")]
    Handshake { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    // Process errors
    #[error("Process launch failed for {app}: {message}")]
    LaunchFailed { app: String, message: String },

    #[error("Access denied to process {pid}")]
    AccessDenied { pid: u32 },

    #[error("Process {pid} is no longer running")]
    ProcessVanished { pid: u32 },

    #[error("Failed to inspect process {pid}: {message}")]
    Introspection { pid: u32, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Payload encoding error: {message}")]
    Encoding { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Operation cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for DeployKit operations.
pub type Result<T> = std::result::Result<T, DeployError>;

// Conversion implementations for common error types

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        DeployError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<base64::DecodeError> for DeployError {
    fn from(err: base64::DecodeError) -> Self {
        DeployError::Encoding {
            message: err.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for DeployError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DeployError::Encoding {
            message: err.to_string(),
        }
    }
}

impl DeployError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DeployError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DeployError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        DeployError::InvalidState {
            message: message.into(),
        }
    }

    /// Check if this error leaves a display session unusable.
    ///
    /// Transport faults and handshake failures end the session; an error
    /// reported by the client itself does not.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            DeployError::ChannelFault { .. }
                | DeployError::Handshake { .. }
                | DeployError::Io { .. }
                | DeployError::Encoding { .. }
                | DeployError::Json { .. }
        )
    }

    /// Check if this error is a per-process introspection fault that the
    /// matcher degrades or skips instead of propagating.
    pub fn is_recoverable_introspection(&self) -> bool {
        matches!(
            self,
            DeployError::AccessDenied { .. }
                | DeployError::ProcessVanished { .. }
                | DeployError::Introspection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeployError::Remote {
            message: "dialog crashed".into(),
        };
        assert_eq!(err.to_string(), "Display client error: dialog crashed");

        let err = DeployError::validation("interval", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Validation error for interval: must be greater than zero"
        );
    }

    #[test]
    fn test_session_fatal_errors() {
        assert!(DeployError::ChannelFault {
            message: "closed".into()
        }
        .is_session_fatal());
        assert!(!DeployError::Remote {
            message: "bad options".into()
        }
        .is_session_fatal());
    }

    #[test]
    fn test_recoverable_introspection() {
        assert!(DeployError::AccessDenied { pid: 4 }.is_recoverable_introspection());
        assert!(DeployError::ProcessVanished { pid: 4 }.is_recoverable_introspection());
        assert!(!DeployError::Cancelled.is_recoverable_introspection());
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let err: DeployError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, DeployError::Io { source: Some(_), .. }));
    }
}
