//! # Ledger Errors
//!
//! The error every [`Ledger`](crate::Ledger) method returns.
//!
//! ## Error Conversion
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CoreError::Validation          → LedgerError::Validation               │
//! │  CoreError::NotFound            → LedgerError::NotFound                 │
//! │  CoreError::InvalidState        → LedgerError::InvalidState             │
//! │  CoreError::InsufficientStock   → LedgerError::InsufficientStock        │
//! │  CoreError::InsufficientPayment → LedgerError::InsufficientPayment      │
//! │  CoreError::InvalidAmount       → LedgerError::InvalidAmount            │
//! │  CoreError::GiftCard*           → LedgerError::GiftCard                 │
//! │                                                                         │
//! │  DbError::NotFound              → LedgerError::NotFound                 │
//! │  DbError::*                     → LedgerError::Database                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each variant maps to a stable [`ErrorCode`] for callers that branch on
//! the kind of failure rather than the message.

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use nautilus_core::{CoreError, Money, TransactionStatus, ValidationError};
use nautilus_db::DbError;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input: empty cart, non-positive quantity, negative tender.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown transaction, catalog item or gift card.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Operation not legal from the transaction's current status.
    #[error("Transaction {transaction_id} is {status}, cannot {operation}")]
    InvalidState {
        transaction_id: String,
        status: TransactionStatus,
        operation: String,
    },

    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Sale tendered below its total. Nothing was written.
    #[error("Insufficient payment: total {required}, tendered {tendered}")]
    InsufficientPayment { required: Money, tendered: Money },

    /// Refund outside `0 < amount <= net paid`.
    #[error("Invalid amount {requested}: must be greater than $0.00 and at most {max}")]
    InvalidAmount { requested: Money, max: Money },

    /// Gift card inactive or short of funds.
    #[error("Gift card error: {0}")]
    GiftCard(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InvalidState,
    InsufficientStock,
    InsufficientPayment,
    InvalidAmount,
    GiftCardError,
    DatabaseError,
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::NotFound { .. } => ErrorCode::NotFound,
            LedgerError::InvalidState { .. } => ErrorCode::InvalidState,
            LedgerError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            LedgerError::InsufficientPayment { .. } => ErrorCode::InsufficientPayment,
            LedgerError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            LedgerError::GiftCard(_) => ErrorCode::GiftCardError,
            LedgerError::Database(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => LedgerError::Validation(e),
            CoreError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            CoreError::InvalidState {
                transaction_id,
                status,
                operation,
            } => LedgerError::InvalidState {
                transaction_id,
                status,
                operation,
            },
            CoreError::InsufficientStock {
                sku,
                available,
                requested,
            } => LedgerError::InsufficientStock {
                sku,
                available,
                requested,
            },
            CoreError::InsufficientPayment { required, tendered } => {
                LedgerError::InsufficientPayment { required, tendered }
            }
            CoreError::InvalidAmount { requested, max } => {
                LedgerError::InvalidAmount { requested, max }
            }
            e @ (CoreError::GiftCardInactive(_) | CoreError::InsufficientGiftCardBalance { .. }) => {
                LedgerError::GiftCard(e.to_string())
            }
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => {
                tracing::error!(error = %other, "Database operation failed");
                LedgerError::Database(other)
            }
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::from(DbError::from(err))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_data() {
        let err: LedgerError = CoreError::InsufficientPayment {
            required: Money::from_cents(2160),
            tendered: Money::from_cents(1000),
        }
        .into();

        assert_eq!(err.code(), ErrorCode::InsufficientPayment);
        assert_eq!(err.to_string(), "Insufficient payment: total $21.60, tendered $10.00");
    }

    #[test]
    fn test_gift_card_errors_collapse() {
        let err: LedgerError = CoreError::GiftCardInactive("gc-1".to_string()).into();
        assert_eq!(err.code(), ErrorCode::GiftCardError);
        assert!(err.to_string().contains("gc-1"));
    }

    #[test]
    fn test_db_not_found_is_not_a_database_error() {
        let err: LedgerError = DbError::not_found("Transaction", "t-9").into();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err: LedgerError = DbError::PoolExhausted.into();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
    }

    #[test]
    fn test_error_code_wire_format() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::InsufficientStock).unwrap(),
            "\"INSUFFICIENT_STOCK\""
        );
    }
}
