//! Error types for the item loader
//!
//! None of these are retried internally: a configuration defect
//! (`UnknownType`) or an input-shape defect (`MalformedRecord`,
//! `MalformedContainer`) aborts the whole item load. Partial graphs are
//! never returned to callers.

use thiserror::Error;

/// Main error type for loader operations
#[derive(Error, Debug)]
pub enum LoaderError {
    /// A requested element type has no entry in the location table.
    /// This is a caller/configuration defect, surfaced immediately.
    #[error("Unknown element type: '{0}' has no registered implementation location")]
    UnknownType(String),

    /// The factory loader could not materialize an implementation.
    #[error("Failed to load element implementation from '{location}': {reason}")]
    FactoryUnavailable { location: String, reason: String },

    /// A serialized element record is missing its type tag or id.
    #[error("Malformed element record: {0}")]
    MalformedRecord(String),

    /// Container data has the wrong shape (body not a string, or
    /// elements not an object).
    #[error("Malformed container data: {0}")]
    MalformedContainer(String),

    /// An element's type tag is absent from the resolved registry.
    /// The caller must resolve the required type set before building.
    #[error("Unresolved element type: '{0}' was not resolved before building")]
    UnresolvedType(String),

    /// The target element has no container capability.
    #[error("Element '{0}' is not a container")]
    NotAContainer(String),

    /// A match-style interaction is missing one of its two choice pools.
    #[error("Match interaction is missing choice set {index}")]
    MissingMatchSet { index: usize },

    /// A recursive walk exceeded its depth limit.
    #[error("Document nesting exceeds the maximum depth of {limit}")]
    NestingTooDeep { limit: usize },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoaderError::UnknownType("choiceInteraction".to_string());
        assert!(err.to_string().contains("choiceInteraction"));
        assert!(err.to_string().contains("no registered implementation"));
    }

    #[test]
    fn test_missing_match_set_names_index() {
        let err = LoaderError::MissingMatchSet { index: 1 };
        assert_eq!(err.to_string(), "Match interaction is missing choice set 1");
    }

    #[test]
    fn test_nesting_too_deep_display() {
        let err = LoaderError::NestingTooDeep { limit: 32 };
        assert!(err.to_string().contains("32"));
    }
}
