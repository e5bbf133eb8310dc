//! # Error Types
//!
//! Domain-specific error types for turnstile-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  turnstile-core errors (this file)                                     │
//! │  ├── CoreError        - Settlement rule violations                     │
//! │  └── ValidationError  - Malformed or missing input                     │
//! │                                                                         │
//! │  turnstile-db errors (separate crate)                                  │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → request layer           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every business failure aborts the whole settlement unit. Nothing here is
//! retried; the caller fixes the input and calls again.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Settlement rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced order, unit or catalog entry does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A ticket unit is not in the state the transition requires.
    ///
    /// ## When This Occurs
    /// ```text
    /// checkout_existing([7, 8])
    ///      │
    ///      ▼
    /// unit 8 is already sold
    ///      │
    ///      ▼
    /// Conflict { unit_id: 8, .. } → whole batch rolled back, unit 7 untouched
    /// ```
    #[error("Ticket {unit_id} cannot be {action}: {reason}")]
    Conflict {
        unit_id: i64,
        action: String,
        reason: String,
    },

    /// Tendered money does not equal the final total (exact, post-rounding).
    #[error("Paid amount ({tendered}) must match final total ({expected})")]
    AmountMismatch { tendered: Money, expected: Money },

    /// `postponed` was combined with another payment line.
    #[error("A postponed payment must be the only payment on an order")]
    InvalidPaymentCombination,

    /// A value outside a closed set reached the storage boundary.
    #[error("Invalid {field}: '{value}'")]
    InvalidInput { field: String, value: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an InvalidInput error.
    pub fn invalid_input(field: impl Into<String>, value: impl ToString) -> Self {
        CoreError::InvalidInput {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched, so a validation failure never leaves
/// a partial effect behind.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, unparsable price).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The same value appears twice where it must be unique.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },

    /// A computed total left the representable range.
    #[error("{field} is too large")]
    Overflow { field: String },

    /// The request reduces to nothing after filtering.
    #[error("No valid {what} to {action}")]
    Empty { what: String, action: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
    pub fn overflow(field: impl Into<String>) -> Self {
        ValidationError::Overflow {
            field: field.into(),
        }
    }
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
        let err = CoreError::AmountMismatch {
            tendered: Money::from_cents(8000),
            expected: Money::from_cents(10000),
        };
        assert_eq!(
            err.to_string(),
            "Paid amount (80.00) must match final total (100.00)"
        );

        let err = CoreError::Conflict {
            unit_id: 8,
            action: "sold".to_string(),
            reason: "status is sold".to_string(),
        };
        assert_eq!(err.to_string(), "Ticket 8 cannot be sold: status is sold");
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::required("user_id").to_string(), "user_id is required");
        assert_eq!(
            ValidationError::must_be_positive("quantity").to_string(),
            "quantity must be positive"
        );
        assert_eq!(ValidationError::overflow("basket total").to_string(), "basket total is too large");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("payments").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
