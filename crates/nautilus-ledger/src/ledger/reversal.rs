//! # Voids and Refunds
//!
//! ## What each undo touches
//! ```text
//! ┌──────────────────┬───────────────┬─────────────────┬──────────────────┐
//! │                  │ reversal      │ reservations    │ status           │
//! ├──────────────────┼───────────────┼─────────────────┼──────────────────┤
//! │ void (pending)   │ none          │ none to release │ → voided         │
//! │ void (paid)      │ - net paid    │ released        │ → voided         │
//! │ refund (partial) │ - amount      │ kept            │ stays paid       │
//! │ refund (full)    │ - amount      │ released        │ → refunded       │
//! └──────────────────┴───────────────┴─────────────────┴──────────────────┘
//! ```
//!
//! A reversal is split across the tenders that paid: each gift card gets
//! back at most what it paid (as a card credit), and the rest goes back on
//! the other methods, one reversal event per tender.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use ts_rs::TS;

use nautilus_core::lifecycle::{ensure_allowed, LedgerOperation};
use nautilus_core::settlement::{check_refund, split_reversal, RefundScope};
use nautilus_core::validation::validate_note;
use nautilus_core::{
    GiftCardActivityKind, Money, PaymentEvent, PaymentKind, Transaction, TransactionStatus,
};
use nautilus_db::commit;
use nautilus_db::repository::{catalog, gift_card, transaction as txn_store};

use super::{enqueue, load, save, Ledger};
use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    pub transaction_id: String,
    pub refunded: Money,
    /// `true` when everything paid has now been returned.
    pub full: bool,
    pub status: TransactionStatus,
    pub amount_paid: Money,
}

impl Ledger {
    /// Cancels a pending or paid transaction.
    ///
    /// Paid transactions get a reversal for the net amount paid and their
    /// reservations released. Voiding a voided transaction does nothing.
    pub async fn void_transaction(
        &self,
        transaction_id: &str,
        reason: Option<String>,
    ) -> LedgerResult<()> {
        debug!(transaction_id = %transaction_id, "void_transaction");

        let reason = validate_note("reason", reason.as_deref())?;

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let mut txn = load(&mut tx, transaction_id).await?;
        if txn.status == TransactionStatus::Voided {
            debug!(transaction_id = %txn.id, "Already voided");
            return Ok(());
        }
        ensure_allowed(&txn, LedgerOperation::Void)?;

        let now = Utc::now();
        let from = txn.status;
        let net_paid = txn.amount_paid();

        let released = release_reservations(&mut tx, &txn.id, now).await?;
        if net_paid.is_positive() {
            reverse(&mut tx, &txn, net_paid, reason.as_deref(), now).await?;
        }

        txn.status = TransactionStatus::Voided;
        txn.amount_paid_cents = 0;
        txn.reason = reason.clone();
        txn.updated_at = now;
        save(&mut tx, &txn, from, LedgerOperation::Void.as_str()).await?;

        txn_store::record_status_change(
            &mut tx,
            &txn.id,
            Some(from),
            TransactionStatus::Voided,
            reason.as_deref(),
            now,
        )
        .await?;

        let event = LedgerEvent::TransactionVoided {
            transaction_id: txn.id.clone(),
            previous_status: from,
            reversed_cents: net_paid.cents(),
            reason,
        };
        let queued = enqueue(&mut tx, &event).await?;

        commit(tx).await?;
        drop(guard);

        info!(
            transaction_id = %txn.id,
            from = %from,
            reversed = %net_paid,
            released,
            "Transaction voided"
        );

        self.notify(&queued, &event).await;
        Ok(())
    }

    /// Returns `amount` of a paid transaction.
    ///
    /// `0 < amount <= net paid`, otherwise `InvalidAmount`. A refund of the
    /// full net amount releases the reservations and marks the transaction
    /// refunded; a smaller one leaves it paid.
    pub async fn refund_transaction(
        &self,
        transaction_id: &str,
        amount: Money,
        reason: Option<String>,
    ) -> LedgerResult<RefundReceipt> {
        debug!(transaction_id = %transaction_id, amount = %amount, "refund_transaction");

        let reason = validate_note("reason", reason.as_deref())?;

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let mut txn = load(&mut tx, transaction_id).await?;
        ensure_allowed(&txn, LedgerOperation::Refund)?;
        let scope = check_refund(amount, txn.amount_paid())?;

        let now = Utc::now();
        let from = txn.status;

        reverse(&mut tx, &txn, amount, reason.as_deref(), now).await?;
        txn.amount_paid_cents -= amount.cents();

        if scope == RefundScope::Full {
            from.ensure_transition(&txn.id, TransactionStatus::Refunded)?;
            release_reservations(&mut tx, &txn.id, now).await?;
            txn.status = TransactionStatus::Refunded;
        }
        if reason.is_some() {
            txn.reason = reason.clone();
        }
        txn.updated_at = now;
        save(&mut tx, &txn, from, LedgerOperation::Refund.as_str()).await?;

        let note = match scope {
            RefundScope::Full => reason.clone(),
            RefundScope::Partial => Some(format!("partial refund of {}", amount)),
        };
        txn_store::record_status_change(&mut tx, &txn.id, Some(from), txn.status, note.as_deref(), now)
            .await?;

        let full = scope == RefundScope::Full;
        let event = LedgerEvent::TransactionRefunded {
            transaction_id: txn.id.clone(),
            amount_cents: amount.cents(),
            full,
            reason,
        };
        let queued = enqueue(&mut tx, &event).await?;

        commit(tx).await?;
        drop(guard);

        info!(
            transaction_id = %txn.id,
            refunded = %amount,
            full,
            remaining = %txn.amount_paid(),
            "Refund recorded"
        );

        self.notify(&queued, &event).await;
        Ok(RefundReceipt {
            transaction_id: txn.id.clone(),
            refunded: amount,
            full,
            status: txn.status,
            amount_paid: txn.amount_paid(),
        })
    }
}

/// Appends one negative payment event per tender for `amount` in total,
/// crediting gift cards for their share.
async fn reverse(
    conn: &mut SqliteConnection,
    txn: &Transaction,
    amount: Money,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> LedgerResult<Vec<PaymentEvent>> {
    let payments = txn_store::payments(conn, &txn.id).await?;

    let mut reversals = Vec::new();
    for share in split_reversal(&payments, amount) {
        if let Some(card_id) = share.gift_card_id.as_deref() {
            gift_card::adjust_balance(
                conn,
                card_id,
                GiftCardActivityKind::Credit,
                share.amount.cents(),
                Some(&txn.id),
                at,
            )
            .await?
            .ok_or_else(|| LedgerError::not_found("Gift card", card_id))?;
        }

        let event = PaymentEvent {
            id: txn_store::generate_id(),
            transaction_id: txn.id.clone(),
            kind: PaymentKind::Reversal,
            method: share.method,
            amount_cents: (-share.amount).cents(),
            tendered_cents: None,
            change_cents: None,
            gift_card_id: share.gift_card_id,
            note: reason.map(str::to_string),
            created_at: at,
        };
        txn_store::insert_payment(conn, &event).await?;

        debug!(
            transaction_id = %txn.id,
            method = %event.method,
            amount = %share.amount,
            "Reversal recorded"
        );
        reversals.push(event);
    }
    Ok(reversals)
}

/// Gives back the capacity held by every active reservation. Returns how
/// many were released.
async fn release_reservations(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    at: DateTime<Utc>,
) -> LedgerResult<usize> {
    let mut released = 0;
    for reservation in txn_store::active_reservations(conn, transaction_id).await? {
        if txn_store::mark_released(conn, &reservation.id, at).await? {
            catalog::release(conn, reservation.kind, &reservation.ref_id, reservation.quantity)
                .await?;
            released += 1;
        }
    }
    Ok(released)
}
