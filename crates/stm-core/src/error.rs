//! Error types for stm-core.

use thiserror::Error;

use crate::config::ConfigValidationError;

/// Result type alias using stm-core Error
pub type StmResult<T> = std::result::Result<T, StmError>;

/// Core error types for short-term memory operations.
///
/// A duplicate insertion is not an error: it is reported through
/// [`crate::Remembered::Duplicate`].
#[derive(Error, Debug)]
pub enum StmError {
    // Caller errors
    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    // Promotion errors
    #[error("long-term store unavailable: {reason}")]
    ExternalStoreUnavailable { reason: String },

    #[error("promotion already in progress for entry {id}")]
    PromotionInProgress { id: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StmError {
    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an external store error
    pub fn external(reason: impl Into<String>) -> Self {
        Self::ExternalStoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the failed operation can be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalStoreUnavailable { .. } | Self::PromotionInProgress { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StmError::invalid_input("session_id", "must not be empty");
        assert!(err.to_string().contains("session_id"));
        assert!(!err.is_retryable());

        let err = StmError::not_found("MemoryEntry", "123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("MemoryEntry"));
        assert!(err.to_string().contains("123"));

        let err = StmError::external("connection refused");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: StmError = ConfigValidationError::InvalidValue {
            field: "default_ttl_secs".into(),
            message: "must be greater than 0".into(),
        }
        .into();
        assert!(matches!(err, StmError::Config(_)));
        assert!(err.to_string().contains("default_ttl_secs"));
    }
}
