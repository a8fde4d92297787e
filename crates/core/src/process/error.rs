//! Error types for the process module.

use std::path::PathBuf;
use thiserror::Error;

use super::types::Operation;

/// Errors raised by command assembly and the execution proxy.
///
/// Failures reported by the external tool itself (non-zero exit, garbled
/// output) are never surfaced here. Poll `has_error` / `error_code` for those.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// No input is registered at the requested position.
    #[error("No input exists for index {index}")]
    InputNotFound { index: usize },

    /// A portable id string could not be parsed.
    #[error("Invalid portable id `{value}`: {reason}")]
    InvalidPortableId { value: String, reason: String },

    /// The execution handle declared a delegated operation unsupported.
    #[error("Operation `{operation}` is not supported by handle {handle} (process {process})")]
    UnsupportedOperation {
        operation: Operation,
        process: String,
        handle: String,
    },

    /// A portable id was requested from a handle running in blocking mode.
    #[error(
        "Cannot create a portable id for process {process}: handle {handle} is blocking. \
         Start the process in non-blocking mode before requesting a portable id"
    )]
    PortableIdWhileBlocking { process: String, handle: String },

    /// The operation requires an execution handle that has not been created yet.
    #[error("Operation `{operation}` requires a started process ({process})")]
    NotStarted {
        operation: &'static str,
        process: String,
    },

    /// The backing storage of a portable id no longer exists.
    #[error("Process output storage not found: {path}")]
    StorageNotFound { path: PathBuf },

    /// The shell running the tool could not be spawned.
    #[error("Failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while managing process storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Creates an invalid portable id error.
    pub fn invalid_portable_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPortableId {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a local, recoverable argument error.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound { .. } | Self::InvalidPortableId { .. }
        )
    }

    /// Whether this signals incorrect use of the process API.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation { .. }
                | Self::PortableIdWhileBlocking { .. }
                | Self::NotStarted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ProcessError::InputNotFound { index: 2 }.is_argument_error());
        assert!(ProcessError::invalid_portable_id("x", "bad").is_argument_error());

        let unsupported = ProcessError::UnsupportedOperation {
            operation: Operation::LastSplit,
            process: "ffmpeg#1".to_string(),
            handle: "mock".to_string(),
        };
        assert!(unsupported.is_misuse());
        assert!(!unsupported.is_argument_error());

        let io = ProcessError::Io(std::io::Error::other("disk"));
        assert!(!io.is_misuse());
        assert!(!io.is_argument_error());
    }

    #[test]
    fn test_unsupported_operation_message_names_everything() {
        let err = ProcessError::UnsupportedOperation {
            operation: Operation::LastSplit,
            process: "ffmpeg#1".to_string(),
            handle: "mock-handle".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("last_split"));
        assert!(message.contains("ffmpeg#1"));
        assert!(message.contains("mock-handle"));
    }
}
