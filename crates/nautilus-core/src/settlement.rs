//! # Settlement Rules
//!
//! How much of a tender is applied to a transaction, and how much of a
//! payment may be handed back.
//!
//! ```text
//!   Sale      tendered ≥ total    → applied = total, change = tendered − total
//!             tendered < total    → InsufficientPayment (nothing written)
//!
//!   Layaway   any tendered ≥ 0    → applied = min(tendered, total)
//!             (a zero deposit still commits the goods)
//!
//!   Installment  amount > 0       → applied = min(amount, balance due)
//!
//!   Refund    0 < amount ≤ paid   → Full when amount == paid, else Partial
//! ```
//!
//! ## Splitting a reversal across tenders
//! Money goes back to where it came from. Each tender (method, plus the card
//! for gift cards) can take back at most its net amount on the transaction:
//! its payments minus what was already reversed to it. Gift cards are
//! credited first, then the remaining tenders in the order they were used.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{PaymentEvent, PaymentMethod, TransactionKind};
use crate::validation::{validate_positive_amount, validate_tender};

/// Result of applying a tender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Amount credited to the transaction.
    pub applied: Money,
    /// Amount handed back to the customer.
    pub change: Money,
}

impl Settlement {
    fn of(applied: Money, tendered: Money) -> Self {
        Settlement {
            applied,
            change: tendered - applied,
        }
    }
}

/// Settles the first payment of a pending transaction.
///
/// Quotes never reach this point; the status machine rejects them first.
///
/// ```rust
/// use nautilus_core::money::Money;
/// use nautilus_core::settlement::settle_tender;
/// use nautilus_core::types::TransactionKind;
///
/// let s = settle_tender(TransactionKind::Sale, Money::from_cents(2160), Money::from_cents(3000)).unwrap();
/// assert_eq!(s.applied.cents(), 2160);
/// assert_eq!(s.change.cents(), 840);
///
/// assert!(settle_tender(TransactionKind::Sale, Money::from_cents(2160), Money::from_cents(1000)).is_err());
/// ```
pub fn settle_tender(kind: TransactionKind, total: Money, tendered: Money) -> CoreResult<Settlement> {
    validate_tender(tendered)?;

    match kind {
        TransactionKind::Layaway => Ok(Settlement::of(tendered.min(total), tendered)),
        TransactionKind::Sale | TransactionKind::Quote => {
            if tendered < total {
                return Err(CoreError::InsufficientPayment {
                    required: total,
                    tendered,
                });
            }
            Ok(Settlement::of(total, tendered))
        }
    }
}

/// Settles a follow-up layaway payment against the outstanding balance.
pub fn settle_installment(balance_due: Money, amount: Money) -> CoreResult<Settlement> {
    validate_positive_amount("amount", amount)?;
    Ok(Settlement::of(amount.min(balance_due), amount))
}

/// Whether a refund empties the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundScope {
    /// Returns everything paid: reservations are released, status → refunded.
    Full,
    /// Returns part of it: status stays paid, reservations untouched.
    Partial,
}

/// Checks a refund against the net amount paid so far.
pub fn check_refund(amount: Money, net_paid: Money) -> CoreResult<RefundScope> {
    if !amount.is_positive() || amount > net_paid {
        return Err(CoreError::InvalidAmount {
            requested: amount,
            max: net_paid,
        });
    }

    if amount == net_paid {
        Ok(RefundScope::Full)
    } else {
        Ok(RefundScope::Partial)
    }
}

/// Part of a reversal owed to one tender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalShare {
    pub method: PaymentMethod,
    pub gift_card_id: Option<String>,
    pub amount: Money,
}

/// Splits `amount` across the tenders recorded in `payments`.
///
/// Whatever the tenders cannot absorb (payments missing from the event
/// log) is returned as a single `Other` share.
pub fn split_reversal(payments: &[PaymentEvent], amount: Money) -> Vec<ReversalShare> {
    let mut tenders: Vec<ReversalShare> = Vec::new();
    for event in payments {
        match tenders
            .iter_mut()
            .find(|t| t.method == event.method && t.gift_card_id == event.gift_card_id)
        {
            Some(tender) => tender.amount += event.amount(),
            None => tenders.push(ReversalShare {
                method: event.method,
                gift_card_id: event.gift_card_id.clone(),
                amount: event.amount(),
            }),
        }
    }
    // Stable: keeps first-use order within each group
    tenders.sort_by_key(|t| t.gift_card_id.is_none());

    let mut remaining = amount;
    let mut shares = Vec::new();
    for tender in tenders {
        if !remaining.is_positive() {
            break;
        }
        if !tender.amount.is_positive() {
            continue;
        }
        let share = tender.amount.min(remaining);
        remaining -= share;
        shares.push(ReversalShare { amount: share, ..tender });
    }

    if remaining.is_positive() {
        shares.push(ReversalShare {
            method: PaymentMethod::Other,
            gift_card_id: None,
            amount: remaining,
        });
    }
    shares
}
