//! Error types for nettable core.

use nettable_codec::EntryType;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by entry store and table accessors.
///
/// Both variants are recoverable: supplying a default to the accessor turns
/// either into a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No live entry exists under the key.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// Full key that was looked up.
        key: String,
    },

    /// The stored value has a different type than requested.
    #[error("type mismatch for {key}: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Full key that was looked up.
        key: String,
        /// Type the caller asked for.
        expected: EntryType,
        /// Type currently stored.
        actual: EntryType,
    },
}

impl CoreError {
    /// Creates a key not found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(key: impl Into<String>, expected: EntryType, actual: EntryType) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected,
            actual,
        }
    }

    /// Returns true if this is a lookup failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::KeyNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            CoreError::key_not_found("/t1/b").to_string(),
            "key not found: /t1/b"
        );
        let err = CoreError::type_mismatch("/t1/b", EntryType::Boolean, EntryType::Number);
        assert_eq!(
            err.to_string(),
            "type mismatch for /t1/b: expected boolean, found number"
        );
        assert!(!err.is_not_found());
    }
}
