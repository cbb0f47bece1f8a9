//! Error types for cosmoform-sql.
//!
//! Statement compilation never touches the network, so the only failures are
//! caller mistakes caught before a request is built.

use thiserror::Error;

/// Query compilation error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Result type for query compilation
pub type SqlResult<T> = Result<T, SqlError>;

impl serde::Serialize for SqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SqlError::Configuration("no aggregate requested".to_string());
        assert_eq!(err.to_string(), "Configuration error: no aggregate requested");

        let err = SqlError::InvalidField("".to_string());
        assert_eq!(err.to_string(), "Invalid field: ");

        let err = SqlError::InvalidFilter("expected object".to_string());
        assert_eq!(err.to_string(), "Invalid filter: expected object");
    }

    #[test]
    fn test_serializes_as_message() {
        let err = SqlError::Configuration("x".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("Configuration error: x"));
    }
}
