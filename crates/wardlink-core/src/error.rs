//! Error types shared across the workspace.

use thiserror::Error;

/// Result type for Wardlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Wardlink error types.
///
/// The message-processing path never surfaces these to the transport; they
/// exist for the operator-facing layer (unknown ids on bind/unbind) and for
/// the persistence plumbing.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Other error.
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("device D-1".to_string());
        assert!(err.to_string().contains("D-1"));
    }
}
