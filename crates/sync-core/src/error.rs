//! # Error Types
//!
//! Domain-specific error types for sync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  sync-core errors (this file)                                          │
//! │  ├── CoreError        - Payload accessor / domain errors               │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  sync-store errors (separate crate)                                    │
//! │  └── StorageError     - Persistence operation failures                 │
//! │                                                                         │
//! │  sync-engine errors (separate crate)                                   │
//! │  └── SyncError        - Coordinator / adapter / retry failures         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StorageError → SyncError          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (id, field, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a caller-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These represent failures to interpret an entry or its payload, not
/// persistence or transport failures (those live in `sync-store::StorageError`
/// and `sync-engine::SyncError` respectively).
#[derive(Debug, Error)]
pub enum CoreError {
    /// The payload is missing a field a conflict strategy needs to read.
    #[error("payload for entry {id} is missing field '{field}'")]
    MissingPayloadField { id: String, field: String },

    /// A field a conflict strategy expected to be a timestamp was not one.
    #[error("payload for entry {id} has a non-timestamp value at '{field}'")]
    InvalidTimestampField { id: String, field: String },

    /// A field a conflict strategy expected to be an integer version was not one.
    #[error("payload for entry {id} has a non-integer value at '{field}'")]
    InvalidVersionField { id: String, field: String },

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller-supplied data doesn't meet the outbox's minimal
/// structural requirements, before any persistence or transport is attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::MissingPayloadField {
            id: "order-1".to_string(),
            field: "updated_at".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "payload for entry order-1 is missing field 'updated_at'"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "id".to_string(),
        };
        assert_eq!(err.to_string(), "id is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
