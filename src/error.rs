//! Custom error types for tfm.

use thiserror::Error;

/// Errors that can occur during instance lifecycle operations.
#[derive(Error, Debug)]
pub enum TfmError {
    #[error("AWS error: {0}")]
    Aws(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Selected instance has no Name tag; an instance folder name cannot be derived")]
    MissingName,

    #[error("No AWS profile configured; pass --profile or set AWS_PROFILE")]
    MissingProfile,

    #[error("{step} failed: {stderr}")]
    CommandFailed { step: String, stderr: String },

    #[error("Instance folder already exists: {0}")]
    FolderExists(String),

    #[error("Instance folder does not exist: {0}")]
    FolderMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TfmError {
    /// Create an AWS error from any error type.
    pub fn aws<E: std::fmt::Display>(err: E) -> Self {
        TfmError::Aws(err.to_string())
    }
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, TfmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_carries_step_and_stderr() {
        let err = TfmError::CommandFailed {
            step: "terraformer import".to_string(),
            stderr: "no credentials found".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("terraformer import"));
        assert!(message.contains("no credentials found"));
    }

    #[test]
    fn test_error_display_missing_profile() {
        let err = TfmError::MissingProfile;
        assert!(err.to_string().contains("AWS_PROFILE"));
    }

    #[test]
    fn test_error_aws_helper() {
        let err = TfmError::aws("connection refused");
        assert_eq!(err.to_string(), "AWS error: connection refused");
    }
}
