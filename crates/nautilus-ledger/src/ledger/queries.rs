//! # Read-side Queries

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use nautilus_core::{InventoryReservation, LineItem, Money, PaymentEvent, StatusChange, Transaction};

use super::Ledger;
use crate::error::{LedgerError, LedgerResult};

/// Where a transaction stands financially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub total: Money,
    pub paid: Money,
    pub due: Money,
}

impl Ledger {
    /// Committed state of one transaction.
    pub async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        self.db
            .transactions()
            .get_by_id(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Transaction", transaction_id))
    }

    /// Line items in cart order.
    pub async fn get_transaction_items(&self, transaction_id: &str) -> LedgerResult<Vec<LineItem>> {
        self.get_transaction(transaction_id).await?;
        Ok(self.db.transactions().get_items(transaction_id).await?)
    }

    /// Payment events, reversals included, in the order recorded.
    pub async fn get_payments(&self, transaction_id: &str) -> LedgerResult<Vec<PaymentEvent>> {
        self.get_transaction(transaction_id).await?;
        Ok(self.db.transactions().get_payments(transaction_id).await?)
    }

    pub async fn get_reservations(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Vec<InventoryReservation>> {
        self.get_transaction(transaction_id).await?;
        Ok(self.db.transactions().get_reservations(transaction_id).await?)
    }

    pub async fn get_status_history(&self, transaction_id: &str) -> LedgerResult<Vec<StatusChange>> {
        self.get_transaction(transaction_id).await?;
        Ok(self.db.transactions().get_status_history(transaction_id).await?)
    }

    pub async fn balance(&self, transaction_id: &str) -> LedgerResult<Balance> {
        let txn = self.get_transaction(transaction_id).await?;
        Ok(Balance {
            total: txn.total(),
            paid: txn.amount_paid(),
            due: txn.balance_due(),
        })
    }
}
