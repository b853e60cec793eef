//! # Checkout

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use nautilus_core::checkout::{
    aggregate_quantities, compute_totals, ensure_available, validate_cart, CartLine, Discount,
    PricedLine,
};
use nautilus_core::validation::validate_note;
use nautilus_core::{CatalogItem, ItemKind, LineItem, Transaction, TransactionKind, TransactionStatus};
use nautilus_db::repository::{catalog, transaction as txn_store};
use nautilus_db::commit;

use super::{enqueue, Ledger};
use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// `None` for a walk-in.
    pub customer_id: Option<String>,
    pub items: Vec<CartLine>,
    pub kind: TransactionKind,
    pub discount: Option<Discount>,
    pub note: Option<String>,
}

impl CheckoutRequest {
    pub fn new(kind: TransactionKind, items: Vec<CartLine>) -> Self {
        CheckoutRequest {
            customer_id: None,
            items,
            kind,
            discount: None,
            note: None,
        }
    }

    pub fn sale(items: Vec<CartLine>) -> Self {
        Self::new(TransactionKind::Sale, items)
    }

    pub fn quote(items: Vec<CartLine>) -> Self {
        Self::new(TransactionKind::Quote, items)
    }

    pub fn layaway(items: Vec<CartLine>) -> Self {
        Self::new(TransactionKind::Layaway, items)
    }

    pub fn for_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl Ledger {
    /// Prices a cart and records it as a pending transaction.
    ///
    /// Sales and layaways must fit the catalog's remaining capacity now, but
    /// nothing is reserved until payment. Quotes skip the capacity check.
    ///
    /// Returns the new transaction id.
    pub async fn create_transaction(&self, request: CheckoutRequest) -> LedgerResult<String> {
        debug!(kind = %request.kind, lines = request.items.len(), "create_transaction");

        validate_cart(&request.items)?;
        let note = validate_note("note", request.note.as_deref())?;
        let customer_id = request
            .customer_id
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let guard = self.write_gate.lock().await;
        let mut tx = self.db.begin().await?;

        let mut resolved: HashMap<(ItemKind, String), CatalogItem> = HashMap::new();
        for (kind, ref_id, requested) in aggregate_quantities(&request.items) {
            let item = catalog::lookup(&mut tx, kind, &ref_id)
                .await?
                .ok_or_else(|| LedgerError::not_found(format!("Catalog item ({})", kind), &ref_id))?;

            if request.kind.holds_inventory() {
                ensure_available(&item, requested)?;
            }
            resolved.insert((kind, ref_id), item);
        }

        let priced: Vec<PricedLine> = request
            .items
            .iter()
            .filter_map(|line| {
                resolved
                    .get(&(line.kind, line.ref_id.clone()))
                    .map(|item| PricedLine::from_catalog(item, line.quantity))
            })
            .collect();

        let totals = compute_totals(&priced, self.tax_rate, request.discount)?;

        let now = Utc::now();
        let txn = Transaction {
            id: txn_store::generate_id(),
            transaction_number: txn_store::generate_transaction_number(now),
            customer_id,
            kind: request.kind,
            status: TransactionStatus::Pending,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            amount_paid_cents: 0,
            note,
            reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        txn_store::insert_transaction(&mut tx, &txn).await?;

        for (position, (line, amounts)) in priced.iter().zip(&totals.lines).enumerate() {
            let item = LineItem {
                id: txn_store::generate_id(),
                transaction_id: txn.id.clone(),
                kind: line.kind,
                ref_id: line.ref_id.clone(),
                sku_snapshot: line.sku.clone(),
                name_snapshot: line.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                line_total_cents: amounts.line_total.cents(),
                tax_cents: amounts.tax.cents(),
                taxable: line.taxable,
                position: position as i64,
                created_at: now,
            };
            txn_store::insert_line_item(&mut tx, &item).await?;
        }

        txn_store::record_status_change(
            &mut tx,
            &txn.id,
            None,
            TransactionStatus::Pending,
            Some("created"),
            now,
        )
        .await?;

        let event = LedgerEvent::TransactionCreated {
            transaction_id: txn.id.clone(),
            transaction_number: txn.transaction_number.clone(),
            kind: txn.kind,
            customer_id: txn.customer_id.clone(),
            total_cents: txn.total_cents,
        };
        let queued = enqueue(&mut tx, &event).await?;

        commit(tx).await?;
        drop(guard);

        info!(
            transaction_id = %txn.id,
            number = %txn.transaction_number,
            kind = %txn.kind,
            total = %txn.total(),
            lines = priced.len(),
            "Transaction created"
        );

        self.notify(&queued, &event).await;
        Ok(txn.id)
    }
}
