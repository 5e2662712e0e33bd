//! Error types for Teagarden validation

use crate::EntityKind;
use thiserror::Error;

/// Client-side validation errors. These block an action before any
/// optimistic mutation or network call happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    #[error("Unknown {kind} referenced by {field}: {id}")]
    UnknownReference {
        kind: EntityKind,
        field: &'static str,
        id: String,
    },

    #[error("Index {index} out of range for list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Result type alias for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Require a non-blank string field.
pub fn require_non_empty(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing { field });
    }
    Ok(())
}

/// Require an index inside `[0, len)`.
pub fn require_index(index: usize, len: usize) -> ValidationResult<()> {
    if index >= len {
        return Err(ValidationError::IndexOutOfRange { index, len });
    }
    Ok(())
}
