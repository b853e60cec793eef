//! # Transaction Lifecycle
//!
//! Which ledger operations are legal from which status.
//!
//! ```text
//!                 pay (accepted)
//!   ┌─────────┐ ─────────────────► ┌─────────┐ ── refund (partial) ──┐
//!   │ PENDING │                    │  PAID   │ ◄─────────────────────┘
//!   └────┬────┘ ◄── pay (refused)  └──┬───┬──┘ ◄── installment (layaway)
//!        │       (stays pending)      │   │
//!        │ void                  void │   │ refund (full)
//!        ▼                            ▼   ▼
//!   ┌─────────┐ ◄─────────────────────┘ ┌──────────┐
//!   │ VOIDED  │                         │ REFUNDED │
//!   └─────────┘                         └──────────┘
//!
//!   FAILED: storable, never entered, nothing leaves it.
//! ```

use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::{Transaction, TransactionKind, TransactionStatus};

/// A mutating ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOperation {
    Pay,
    RecordInstallment,
    Void,
    Refund,
}

impl LedgerOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LedgerOperation::Pay => "pay",
            LedgerOperation::RecordInstallment => "record installment",
            LedgerOperation::Void => "void",
            LedgerOperation::Refund => "refund",
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransactionStatus {
    /// Voided and refunded transactions never change again.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Voided | TransactionStatus::Refunded)
    }

    /// The status transition table.
    pub const fn can_transition_to(&self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, to),
            (Pending, Paid) | (Pending, Voided) | (Paid, Voided) | (Paid, Refunded)
        )
    }

    /// Fails with `InvalidState` unless `self → to` is in the table.
    pub fn ensure_transition(
        &self,
        transaction_id: &str,
        to: TransactionStatus,
    ) -> CoreResult<()> {
        if !self.can_transition_to(to) {
            return Err(CoreError::InvalidState {
                transaction_id: transaction_id.to_string(),
                status: *self,
                operation: format!("move to {}", to),
            });
        }
        Ok(())
    }
}

/// Checks that `operation` may run against `transaction` as it stands.
///
/// Voiding an already-voided transaction is handled by the caller as a
/// no-op before this check runs.
pub fn ensure_allowed(transaction: &Transaction, operation: LedgerOperation) -> CoreResult<()> {
    let status = transaction.status;
    let allowed = match operation {
        LedgerOperation::Pay => {
            status == TransactionStatus::Pending && transaction.kind != TransactionKind::Quote
        }
        LedgerOperation::RecordInstallment => {
            status == TransactionStatus::Paid && transaction.kind == TransactionKind::Layaway
        }
        LedgerOperation::Void => status.can_transition_to(TransactionStatus::Voided),
        LedgerOperation::Refund => status == TransactionStatus::Paid,
    };

    if !allowed {
        return Err(CoreError::InvalidState {
            transaction_id: transaction.id.clone(),
            status,
            operation: operation.to_string(),
        });
    }
    Ok(())
}
