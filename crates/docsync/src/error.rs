//! Error types for the transfer library.

use thiserror::Error;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document store read/write error with context
    #[error("Store error: {message}\n  Context: {context}")]
    Store { message: String, context: String },

    /// Transfer failed for a specific collection
    #[error("Transfer failed for collection {collection}: {message}")]
    Transfer { collection: String, message: String },

    /// Checkpoint file error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Loaded checkpoint is incompatible with the current run
    #[error("Checkpoint is not resumable with this configuration: {0}")]
    ResumeIncompatible(String),

    /// Document transform rejected or failed
    #[error("Transform error: {0}")]
    Transform(String),

    /// Post-transfer verification failed
    #[error("Verification failed: {0}")]
    Verification(String),

    /// A spawned task panicked
    #[error("Task panicked: {0}")]
    TaskPanic(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// Create a Store error with context about where it occurred
    pub fn store(message: impl Into<String>, context: impl Into<String>) -> Self {
        SyncError::Store {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(collection: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Transfer {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI layer.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => 1,
            SyncError::Checkpoint(_) | SyncError::ResumeIncompatible(_) => 3,
            SyncError::Transform(_) => 4,
            SyncError::Verification(_) => 5,
            SyncError::Io(_) => 7,
            _ => 2,
        }
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_message() {
        let err = SyncError::transfer("users", "commit rejected");
        assert_eq!(
            err.to_string(),
            "Transfer failed for collection users: commit rejected"
        );
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SyncError::Io(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error"));
        assert!(detailed.contains("Caused by"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::Config("x".into()).exit_code(), 1);
        assert_eq!(SyncError::Checkpoint("x".into()).exit_code(), 3);
        assert_eq!(SyncError::transfer("c", "m").exit_code(), 2);
    }
}
