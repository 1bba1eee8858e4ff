// src/utils/errors.rs
//! Error types for the inspector
//!
//! Only configuration and registration problems surface as errors. Capture
//! failures degrade to placeholders and wrapped-operation failures are handed
//! back to the caller untouched, so neither appears here.

use thiserror::Error;

/// Inspector error
#[derive(Debug, Error)]
pub enum InspectorError {
    /// A configuration value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A hook with the same name is already wrapped
    #[error("Hook '{0}' is already registered")]
    DuplicateRegistration(String),

    /// Configuration sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// A captured record could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Export to an interchange format failed
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// The inspector has already been shut down
    #[error("Inspector is shut down")]
    ShutDown,

    /// A background task was started outside a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, InspectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = InspectorError::DuplicateRegistration("fetch".to_string());
        assert_eq!(err.to_string(), "Hook 'fetch' is already registered");

        let err = InspectorError::InvalidConfig("capacity must be > 0".to_string());
        assert!(err.to_string().contains("capacity must be > 0"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: InspectorError = parse.unwrap_err().into();
        assert!(matches!(err, InspectorError::Serialization(_)));
    }
}
