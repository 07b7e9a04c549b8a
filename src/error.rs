// Error types for the edit engine
//
// Validation and change detection never produce these: their failures are
// returned as data. Only persistence and configuration paths return errors.

use crate::record_type::AggregateType;

/// Errors raised by stores and configuration loading
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON (de)serialisation failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested aggregate does not exist
    #[error("{kind} {key} not found")]
    NotFound { kind: AggregateType, key: i64 },

    /// Store refused the save
    #[error("save rejected: {0}")]
    Rejected(String),
}

pub type EditResult<T> = Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = EditError::NotFound {
            kind: AggregateType::Street,
            key: 12345,
        };
        assert_eq!(err.to_string(), "street 12345 not found");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EditError = json_err.into();
        assert!(matches!(err, EditError::Serialization(_)));
    }
}
