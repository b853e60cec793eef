//! # Payments
//!
//! First payment of a pending transaction, and follow-up installments on a
//! layaway.
//!
//! ## process_payment
//! ```text
//! pending ──► settle tender ──► debit gift card? ──► payment event
//!                                                         │
//!             reserve every line (guarded UPDATE) ◄───────┘
//!                     │
//!                     ▼
//!            status = paid, outbox "transaction.completed"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use ts_rs::TS;

use nautilus_core::lifecycle::{ensure_allowed, LedgerOperation};
use nautilus_core::settlement::{settle_installment, settle_tender, Settlement};
use nautilus_core::validation::validate_note;
use nautilus_core::{
    CoreError, GiftCardActivityKind, GiftCardStatus, InventoryReservation, Money, PaymentEvent,
    PaymentKind, PaymentMethod, Transaction, TransactionStatus, ValidationError,
};
use nautilus_db::commit;
use nautilus_db::repository::{catalog, gift_card, transaction as txn_store};

use super::{enqueue, load, save, Ledger};
use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;

/// A tender presented at the till.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    /// What the customer handed over.
    pub amount: Money,
    /// Required for gift card payments, rejected otherwise.
    pub gift_card_id: Option<String>,
    pub note: Option<String>,
}

impl PaymentRequest {
    pub fn new(method: PaymentMethod, amount: Money) -> Self {
        PaymentRequest {
            method,
            amount,
            gift_card_id: None,
            note: None,
        }
    }

    pub fn cash(amount: Money) -> Self {
        Self::new(PaymentMethod::Cash, amount)
    }

    pub fn card(amount: Money) -> Self {
        Self::new(PaymentMethod::Card, amount)
    }

    pub fn gift_card(gift_card_id: impl Into<String>, amount: Money) -> Self {
        PaymentRequest {
            gift_card_id: Some(gift_card_id.into()),
            ..Self::new(PaymentMethod::GiftCard, amount)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Checks the method/card pairing and normalizes the note.
    fn validated(self) -> LedgerResult<Self> {
        match (self.method, self.gift_card_id.as_deref()) {
            (PaymentMethod::GiftCard, None) => {
                return Err(ValidationError::Required {
                    field: "gift_card_id".to_string(),
                }
                .into());
            }
            (PaymentMethod::GiftCard, Some(_)) => {}
            (_, Some(_)) => {
                return Err(ValidationError::InvalidFormat {
                    field: "gift_card_id".to_string(),
                    reason: "only allowed with gift card payments".to_string(),
                }
                .into());
            }
            (_, None) => {}
        }

        let note = validate_note("note", self.note.as_deref())?;
        Ok(PaymentRequest { note, ..self })
    }
}

/// Outcome of an accepted payment or installment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub status: TransactionStatus,
    /// Credited to the transaction.
    pub applied: Money,
    /// Handed back to the customer.
    pub change: Money,
    pub amount_paid: Money,
    pub balance_due: Money,
}

impl PaymentReceipt {
    fn for_transaction(txn: &Transaction, settlement: Settlement) -> Self {
        PaymentReceipt {
            transaction_id: txn.id.clone(),
            status: txn.status,
            applied: settlement.applied,
            change: settlement.change,
            amount_paid: txn.amount_paid(),
            balance_due: txn.balance_due(),
        }
    }
}

impl Ledger {
    /// Accepts the first payment on a pending sale or layaway.
    ///
    /// In one unit of work: settles the tender, debits a gift card if used,
    /// appends the payment event, reserves stock for every line and moves the
    /// transaction to paid. A sale tendered short fails with
    /// `InsufficientPayment` and leaves the transaction pending. A layaway
    /// accepts any deposit, including zero.
    pub async fn process_payment(
        &self,
        transaction_id: &str,
        request: PaymentRequest,
    ) -> LedgerResult<PaymentReceipt> {
        debug!(transaction_id = %transaction_id, method = %request.method, amount = %request.amount, "process_payment");

        let request = request.validated()?;

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let mut txn = load(&mut tx, transaction_id).await?;
        ensure_allowed(&txn, LedgerOperation::Pay)?;
        txn.status.ensure_transition(&txn.id, TransactionStatus::Paid)?;

        let settlement = settle_tender(txn.kind, txn.total(), request.amount)?;
        let now = Utc::now();

        apply_tender(&mut tx, &txn, &request, settlement, now).await?;
        reserve_lines(&mut tx, &txn.id, now).await?;

        let from = txn.status;
        txn.status = TransactionStatus::Paid;
        txn.amount_paid_cents += settlement.applied.cents();
        txn.paid_at = Some(now);
        txn.updated_at = now;
        save(&mut tx, &txn, from, LedgerOperation::Pay.as_str()).await?;

        txn_store::record_status_change(
            &mut tx,
            &txn.id,
            Some(from),
            TransactionStatus::Paid,
            request.note.as_deref(),
            now,
        )
        .await?;

        let event = LedgerEvent::TransactionCompleted {
            transaction_id: txn.id.clone(),
            kind: txn.kind,
            customer_id: txn.customer_id.clone(),
            total_cents: txn.total_cents,
            amount_paid_cents: txn.amount_paid_cents,
        };
        let queued = enqueue(&mut tx, &event).await?;

        commit(tx).await?;
        drop(guard);

        info!(
            transaction_id = %txn.id,
            method = %request.method,
            applied = %settlement.applied,
            change = %settlement.change,
            balance_due = %txn.balance_due(),
            "Payment accepted"
        );

        self.notify(&queued, &event).await;
        Ok(PaymentReceipt::for_transaction(&txn, settlement))
    }

    /// Records a further payment on a paid layaway.
    ///
    /// Anything above the outstanding balance is returned as change.
    pub async fn record_installment(
        &self,
        transaction_id: &str,
        request: PaymentRequest,
    ) -> LedgerResult<PaymentReceipt> {
        debug!(transaction_id = %transaction_id, amount = %request.amount, "record_installment");

        let request = request.validated()?;

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let mut txn = load(&mut tx, transaction_id).await?;
        ensure_allowed(&txn, LedgerOperation::RecordInstallment)?;

        let balance_due = txn.balance_due();
        if balance_due.is_zero() {
            return Err(LedgerError::InvalidState {
                transaction_id: txn.id.clone(),
                status: txn.status,
                operation: "record installment on a settled layaway".to_string(),
            });
        }

        let settlement = settle_installment(balance_due, request.amount)?;
        let now = Utc::now();

        apply_tender(&mut tx, &txn, &request, settlement, now).await?;

        txn.amount_paid_cents += settlement.applied.cents();
        txn.updated_at = now;
        save(&mut tx, &txn, TransactionStatus::Paid, LedgerOperation::RecordInstallment.as_str())
            .await?;

        let event = LedgerEvent::InstallmentRecorded {
            transaction_id: txn.id.clone(),
            amount_cents: settlement.applied.cents(),
            balance_due_cents: txn.balance_due().cents(),
        };
        let queued = enqueue(&mut tx, &event).await?;

        commit(tx).await?;
        drop(guard);

        info!(
            transaction_id = %txn.id,
            applied = %settlement.applied,
            balance_due = %txn.balance_due(),
            "Installment recorded"
        );

        self.notify(&queued, &event).await;
        Ok(PaymentReceipt::for_transaction(&txn, settlement))
    }
}

/// Debits the gift card (if any) and appends the payment event.
///
/// A zero settlement (layaway with no deposit) writes nothing.
async fn apply_tender(
    conn: &mut SqliteConnection,
    txn: &Transaction,
    request: &PaymentRequest,
    settlement: Settlement,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    if !settlement.applied.is_positive() {
        return Ok(());
    }

    if let Some(card_id) = request.gift_card_id.as_deref() {
        redeem_gift_card(conn, card_id, settlement.applied, &txn.id, at).await?;
    }

    let event = PaymentEvent {
        id: txn_store::generate_id(),
        transaction_id: txn.id.clone(),
        kind: PaymentKind::Payment,
        method: request.method,
        amount_cents: settlement.applied.cents(),
        tendered_cents: Some(request.amount.cents()),
        change_cents: Some(settlement.change.cents()),
        gift_card_id: request.gift_card_id.clone(),
        note: request.note.clone(),
        created_at: at,
    };
    txn_store::insert_payment(conn, &event).await?;

    Ok(())
}

async fn redeem_gift_card(
    conn: &mut SqliteConnection,
    card_id: &str,
    amount: Money,
    transaction_id: &str,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    let card = gift_card::fetch(conn, card_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Gift card", card_id))?;

    if card.status != GiftCardStatus::Active {
        return Err(CoreError::GiftCardInactive(card.id).into());
    }
    let balance = card.balance();
    if balance < amount {
        return Err(CoreError::InsufficientGiftCardBalance {
            card_id: card.id,
            balance,
            requested: amount,
        }
        .into());
    }

    let redeemed = gift_card::adjust_balance(
        conn,
        card_id,
        GiftCardActivityKind::Redeem,
        amount.cents(),
        Some(transaction_id),
        at,
    )
    .await?;

    if redeemed.is_none() {
        return Err(LedgerError::GiftCard(format!(
            "gift card {} could not be debited",
            card_id
        )));
    }
    Ok(())
}

/// Takes capacity for every line of the transaction, recording one
/// reservation per line.
async fn reserve_lines(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    at: DateTime<Utc>,
) -> LedgerResult<()> {
    for line in txn_store::items(conn, transaction_id).await? {
        if !catalog::reserve(conn, line.kind, &line.ref_id, line.quantity).await? {
            let item = catalog::fetch(conn, line.kind, &line.ref_id)
                .await?
                .ok_or_else(|| {
                    LedgerError::not_found(format!("Catalog item ({})", line.kind), &line.ref_id)
                })?;
            // Deactivated since checkout: nothing left to sell
            let available = if item.is_active { item.available_quantity } else { 0 };

            return Err(LedgerError::InsufficientStock {
                sku: line.sku_snapshot,
                available,
                requested: line.quantity,
            });
        }

        let reservation = InventoryReservation {
            id: txn_store::generate_id(),
            transaction_id: transaction_id.to_string(),
            line_item_id: line.id.clone(),
            kind: line.kind,
            ref_id: line.ref_id.clone(),
            quantity: line.quantity,
            created_at: at,
            released_at: None,
        };
        txn_store::insert_reservation(conn, &reservation).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_card_id_pairs_with_method() {
        let ok = PaymentRequest::gift_card("gc-1", Money::from_cents(500)).validated();
        assert!(ok.is_ok());

        let missing = PaymentRequest::new(PaymentMethod::GiftCard, Money::from_cents(500)).validated();
        assert!(matches!(missing, Err(LedgerError::Validation(ValidationError::Required { .. }))));

        let stray = PaymentRequest {
            gift_card_id: Some("gc-1".to_string()),
            ..PaymentRequest::cash(Money::from_cents(500))
        }
        .validated();
        assert!(matches!(stray, Err(LedgerError::Validation(ValidationError::InvalidFormat { .. }))));
    }

    #[test]
    fn test_blank_note_dropped() {
        let request = PaymentRequest::cash(Money::from_cents(500))
            .with_note("   ")
            .validated()
            .unwrap();
        assert_eq!(request.note, None);
    }
}
