use thiserror::Error;

use crate::types::UserUid;

/// Top-level error type for the relay system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for RelayError` (or the reverse) so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RelayError {
    fn from(err: toml::ser::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

/// Errors from the identity cache and session store.
///
/// Absence of a key is only an error for required-reference lookups;
/// existence checks return `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("user [{uid}] access denied [{answer_id}]")]
    AccessDenied { uid: UserUid, answer_id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("capability not implemented: {0}")]
    NotImplemented(&'static str),
}

impl StoreError {
    /// Whether this error only reports a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unavailable(format!("serialization: {}", err))
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        RelayError::Storage(err.to_string())
    }
}

/// A specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let relay_err: RelayError = io_err.into();
        assert!(matches!(relay_err, RelayError::Io(_)));
        assert!(relay_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let relay_err: RelayError = err.into();
        assert!(matches!(relay_err, RelayError::Config(_)));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound("userID[wecom:alice]".to_string());
        assert_eq!(err.to_string(), "not found: userID[wecom:alice]");

        let err = StoreError::AccessDenied {
            uid: UserUid::new("u-1"),
            answer_id: "gpt-a".to_string(),
        };
        assert_eq!(err.to_string(), "user [u-1] access denied [gpt-a]");

        let err = StoreError::NotImplemented("balance");
        assert_eq!(err.to_string(), "capability not implemented: balance");
    }

    #[test]
    fn test_store_error_is_not_found() {
        assert!(StoreError::NotFound("x".into()).is_not_found());
        assert!(!StoreError::Unavailable("x".into()).is_not_found());
    }

    #[test]
    fn test_store_error_into_relay_error() {
        let err: RelayError = StoreError::Unavailable("connection reset".into()).into();
        assert!(matches!(err, RelayError::Storage(_)));
        assert!(err.to_string().contains("connection reset"));
    }
}
