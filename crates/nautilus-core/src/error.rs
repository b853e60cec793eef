//! # Error Types
//!
//! Domain errors raised by the pure ledger rules.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  nautilus-core (this file)                                             │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  nautilus-db                                                           │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  nautilus-ledger                                                       │
//! │  └── LedgerError      - What callers of the Ledger see                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │                          DbError ───┴──► LedgerError → caller          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;
use crate::types::TransactionStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown transaction, catalog item or gift card.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation is not legal from the transaction's current status.
    ///
    /// ## When This Occurs
    /// - Paying a transaction that is already paid or voided
    /// - Refunding a pending transaction
    /// - Paying a quote
    #[error("Transaction {transaction_id} is {status}, cannot {operation}")]
    InvalidState {
        transaction_id: String,
        status: TransactionStatus,
        operation: String,
    },

    /// A line asks for more stock/seats/slots than the catalog holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout: 4 × "Open Water course seat"
    ///      │
    ///      ▼
    /// Catalog: 3 seats left
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "OW-0612", available: 3, requested: 4 }
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A sale was tendered less than its total.
    #[error("Insufficient payment: total {required}, tendered {tendered}")]
    InsufficientPayment { required: Money, tendered: Money },

    /// Refund amount is non-positive or exceeds what was paid.
    #[error("Invalid amount {requested}: must be greater than $0.00 and at most {max}")]
    InvalidAmount { requested: Money, max: Money },

    /// Gift card exists but has been deactivated.
    #[error("Gift card {0} is inactive")]
    GiftCardInactive(String),

    /// Gift card balance does not cover the redemption.
    #[error("Gift card {card_id} balance {balance} is less than {requested}")]
    InsufficientGiftCardBalance {
        card_id: String,
        balance: Money,
        requested: Money,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
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

    /// Invalid format (e.g., invalid UUID, card number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "OW-0612".to_string(),
            available: 3,
            requested: 4,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for OW-0612: available 3, requested 4"
        );

        let err = CoreError::InsufficientPayment {
            required: Money::from_cents(2160),
            tendered: Money::from_cents(1000),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient payment: total $21.60, tendered $10.00"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = CoreError::InvalidState {
            transaction_id: "abc".to_string(),
            status: TransactionStatus::Refunded,
            operation: "void".to_string(),
        };
        assert_eq!(err.to_string(), "Transaction abc is refunded, cannot void");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
