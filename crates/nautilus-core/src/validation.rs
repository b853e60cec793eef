//! # Validation Module
//!
//! Input checks run before any ledger operation touches the database.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure)                                           │
//! │  ├── Cart shape (non-empty, ≤ 100 lines, quantities 1..=999)           │
//! │  ├── Amount signs (tender ≥ 0, refund/installment > 0)                 │
//! │  └── Note / reason length, id format                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger service                                               │
//! │  ├── Catalog resolution (NotFound)                                     │
//! │  └── Status and capacity rules (InvalidState, InsufficientStock)       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantities > 0, balances ≥ 0)                  │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use nautilus_core::validation::{validate_cart_size, validate_quantity};
//!
//! validate_cart_size(3).unwrap();
//! validate_quantity(2).unwrap();
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_NOTE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Length of a printed gift card number.
pub const GIFT_CARD_NUMBER_LENGTH: usize = 16;

// =============================================================================
// Cart Validators
// =============================================================================

/// Validates the number of lines in a checkout.
///
/// ## Rules
/// - At least one line
/// - At most MAX_CART_ITEMS (100)
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Checkout: 2 × rental BCD                                               │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(2) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0?  → "quantity must be positive"                     │
/// │       ├── qty > 999? → "quantity must be between 1 and 999"            │
/// │       └── OK → catalog lookup                                          │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a catalog reference id.
pub fn validate_ref_id(ref_id: &str) -> ValidationResult<()> {
    if ref_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "ref_id".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates a tendered amount.
///
/// Zero is allowed: a layaway may be committed with no deposit.
///
/// ```rust
/// use nautilus_core::money::Money;
/// use nautilus_core::validation::validate_tender;
///
/// assert!(validate_tender(Money::zero()).is_ok());
/// assert!(validate_tender(Money::from_cents(-1)).is_err());
/// ```
pub fn validate_tender(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an amount that has to move money (gift card issue/reload,
/// installments).
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a unit price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Text Validators
// =============================================================================

/// Validates an optional free-text note and returns it trimmed.
///
/// Blank notes collapse to `None`.
pub fn validate_note(field: &str, note: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LENGTH,
        });
    }

    Ok(Some(note.to_string()))
}

/// Validates a printed gift card number: exactly 16 ASCII digits.
pub fn validate_card_number(number: &str) -> ValidationResult<()> {
    let number = number.trim();

    if number.is_empty() {
        return Err(ValidationError::Required {
            field: "card_number".to_string(),
        });
    }

    if number.len() != GIFT_CARD_NUMBER_LENGTH || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "card_number".to_string(),
            reason: format!("must be {} digits", GIFT_CARD_NUMBER_LENGTH),
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ```rust
/// use nautilus_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_ok());

        assert!(matches!(
            validate_cart_size(0),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_cart_size(MAX_CART_ITEMS + 1).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_tender(Money::zero()).is_ok());
        assert!(validate_tender(Money::from_cents(2160)).is_ok());
        assert!(validate_tender(Money::from_cents(-5)).is_err());

        assert!(validate_positive_amount("amount", Money::from_cents(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::zero()).is_err());

        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-100).is_err());
    }

    #[test]
    fn test_validate_note() {
        assert_eq!(validate_note("reason", None).unwrap(), None);
        assert_eq!(validate_note("reason", Some("   ")).unwrap(), None);
        assert_eq!(
            validate_note("reason", Some("  customer changed mind ")).unwrap(),
            Some("customer changed mind".to_string())
        );
        assert!(validate_note("reason", Some(&"x".repeat(MAX_NOTE_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_validate_card_number() {
        assert!(validate_card_number("4000123412341234").is_ok());
        assert!(validate_card_number("").is_err());
        assert!(validate_card_number("4000-1234").is_err());
        assert!(validate_card_number("40001234123412345").is_err());
    }

    #[test]
    fn test_validate_uuid_and_tax_rate() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_ref_id("").is_err());
        assert!(validate_ref_id("trip-7").is_ok());

        assert!(validate_tax_rate_bps(800).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }
}
