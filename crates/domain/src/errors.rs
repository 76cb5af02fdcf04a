//! Error types used throughout the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for FieldLink
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum FieldLinkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("CRM adapter error: {0}")]
    Adapter(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for FieldLink operations
pub type Result<T> = std::result::Result<T, FieldLinkError>;

impl FieldLinkError {
    /// The message carried by the error, without the variant prefix.
    ///
    /// Sync history and report failure columns store the vendor/database
    /// message verbatim; the variant prefix stays out of persisted rows.
    pub fn detail(&self) -> &str {
        match self {
            Self::Database(msg)
            | Self::Config(msg)
            | Self::Network(msg)
            | Self::Adapter(msg)
            | Self::NotFound(msg)
            | Self::InvalidInput(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_strips_variant_prefix() {
        let err = FieldLinkError::Adapter("INVALID_FIELD".into());
        assert_eq!(err.detail(), "INVALID_FIELD");
        assert_eq!(err.to_string(), "CRM adapter error: INVALID_FIELD");
    }

    #[test]
    fn serializes_with_type_tag() {
        let err = FieldLinkError::NotFound("report 42".into());
        let json = serde_json::to_value(&err).expect("serializable");
        assert_eq!(json["type"], "NotFound");
        assert_eq!(json["message"], "report 42");
    }
}
