//! # Validation Module
//!
//! Business-rule validation for settlement requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer                                                │
//! │  ├── Field presence, numeric types (serde)                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction starts)                  │
//! │  ├── Buyer present, payments present                                   │
//! │  ├── Positive quantity, positive price                                 │
//! │  └── No duplicate unit ids                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK on status, method, quantity and sale fields                 │
//! │  ├── UNIQUE (order_id, meal_id), UNIQUE (category, subcategory)        │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use turnstile_core::validation::{validate_quantity, validate_user_id};
//!
//! assert_eq!(validate_user_id(Some("  u-42 ")).unwrap(), "u-42");
//! validate_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::UnitPrice;
use crate::types::PaymentLine;
use crate::{MAX_DESCRIPTION_LEN, MAX_LINE_QUANTITY, MAX_UNIT_PRICE_E4};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of a buyer reference.
const MAX_USER_ID_LEN: usize = 100;

/// Maximum length of catalog names (category, subcategory, meal name).
const MAX_NAME_LEN: usize = 100;

// =============================================================================
// String Validators
// =============================================================================

/// Validates the buyer reference and returns it trimmed.
///
/// ## Rules
/// - Must be present and not blank
/// - At most 100 characters
pub fn validate_user_id(user_id: Option<&str>) -> ValidationResult<String> {
    let user_id = user_id.map(str::trim).unwrap_or_default();

    if user_id.is_empty() {
        return Err(ValidationError::required("user_id"));
    }

    if user_id.chars().count() > MAX_USER_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "user_id".to_string(),
            max: MAX_USER_ID_LEN,
        });
    }

    Ok(user_id.to_string())
}

/// Validates the optional order description. Blank becomes `None`.
pub fn validate_description(description: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }

    Ok(Some(description.to_string()))
}

/// Validates a catalog name such as a ticket category or meal name.
///
/// ```rust
/// use turnstile_core::validation::validate_name;
///
/// assert!(validate_name("category", "Adult").is_ok());
/// assert!(validate_name("category", "  ").is_err());
/// ```
pub fn validate_name(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a catalog or caller-supplied price. Zero is not a price.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed MAX_UNIT_PRICE_E4
///
/// ```rust
/// use turnstile_core::money::UnitPrice;
/// use turnstile_core::validation::validate_price;
///
/// assert!(validate_price(UnitPrice::from_cents(1099)).is_ok());
/// assert!(validate_price(UnitPrice::from_e4(0)).is_err());
/// assert!(validate_price(UnitPrice::from_e4(i64::MAX)).is_err());
/// ```
pub fn validate_price(price: UnitPrice) -> ValidationResult<()> {
    if !price.is_positive() {
        return Err(ValidationError::must_be_positive("price"));
    }

    if price.e4() > MAX_UNIT_PRICE_E4 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 1,
            max: MAX_UNIT_PRICE_E4,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Requires a payment breakdown to be present and non-empty.
pub fn validate_payments(payments: Option<&[PaymentLine]>) -> ValidationResult<&[PaymentLine]> {
    match payments {
        Some(lines) if !lines.is_empty() => Ok(lines),
        _ => Err(ValidationError::required("payments")),
    }
}

/// Requires a non-empty list of distinct unit ids.
pub fn validate_unit_ids(unit_ids: &[i64]) -> ValidationResult<()> {
    if unit_ids.is_empty() {
        return Err(ValidationError::required("unit_ids"));
    }

    let mut seen = HashSet::with_capacity(unit_ids.len());
    if let Some(dup) = unit_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(ValidationError::Duplicate {
            field: "unit_id".to_string(),
            value: dup.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string (order and payment ids).
///
/// ```rust
/// use turnstile_core::validation::validate_uuid;
///
/// assert!(validate_uuid("order_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("order_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::PaymentMethod;

    #[test]
    fn test_validate_user_id() {
        assert_eq!(validate_user_id(Some("buyer-1")).unwrap(), "buyer-1");
        assert!(validate_user_id(None).is_err());
        assert!(validate_user_id(Some("   ")).is_err());
        assert!(validate_user_id(Some("u".repeat(101).as_str())).is_err());
    }

    #[test]
    fn test_validate_description() {
        assert_eq!(validate_description(None).unwrap(), None);
        assert_eq!(validate_description(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_description(Some(" school group ")).unwrap().as_deref(),
            Some("school group")
        );
        assert!(validate_description(Some("x".repeat(501).as_str())).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(1000).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1001).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(UnitPrice::from_e4(1)).is_ok());
        assert!(validate_price(UnitPrice::from_e4(MAX_UNIT_PRICE_E4)).is_ok());

        assert!(validate_price(UnitPrice::from_e4(0)).is_err());
        assert!(matches!(
            validate_price(UnitPrice::from_e4(MAX_UNIT_PRICE_E4 + 1)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_price(UnitPrice::from_e4(i64::MAX / 2)).is_err());
    }

    #[test]
    fn test_validate_payments() {
        let lines = [PaymentLine::new(PaymentMethod::Cash, Money::from_cents(100))];
        assert_eq!(validate_payments(Some(&lines[..])).unwrap().len(), 1);
        assert!(validate_payments(Some(&[] as &[PaymentLine])).is_err());
        assert!(validate_payments(None).is_err());
    }

    #[test]
    fn test_validate_unit_ids() {
        assert!(validate_unit_ids(&[1, 2, 3]).is_ok());
        assert!(matches!(validate_unit_ids(&[]), Err(ValidationError::Required { .. })));
        assert!(matches!(
            validate_unit_ids(&[4, 5, 4]),
            Err(ValidationError::Duplicate { ref value, .. }) if value == "4"
        ));
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }
}
