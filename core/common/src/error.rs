//! Common error types for the secret key manager.

use thiserror::Error;

/// Top-level error type for key manager operations.
///
/// "Key not found" is deliberately absent from the lookup path: absence is
/// reported as `Ok(None)`. `NotFound` is used for registry lookups by name.
#[derive(Debug, Error)]
pub enum Error {
    /// A provider failed internally while reading or writing a key.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An external command backing a provider failed.
    #[error("Command error: {0}")]
    Command(String),

    /// The OS keyring rejected an operation.
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// A provider call exceeded its time budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration file could not be interpreted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted (e.g. writing to a read-only provider).
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
