//! # Transaction Repository
//!
//! Transactions and everything that hangs off them: line items, payment
//! events, inventory reservations and the status history.
//!
//! ## Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Reads (queries)                     Writes (ledger operations)         │
//! │  ──────────────────────────────      ────────────────────────────────   │
//! │  db.transactions().get_by_id(id)     let mut tx = db.begin().await?;    │
//! │  db.transactions().get_items(id)     transaction::fetch(&mut tx, id)    │
//! │  db.transactions().get_payments(id)  transaction::insert_payment(...)   │
//! │       │                              transaction::update_state(...)     │
//! │       ▼                              commit(tx).await?                  │
//! │  any pooled connection                    │                             │
//! │                                           ▼                             │
//! │                                      one connection, all-or-nothing     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line items, payment events and status rows are insert-only. The only
//! UPDATEs are the transaction's own ledger columns and a reservation's
//! `released_at` stamp.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use nautilus_core::{
    InventoryReservation, LineItem, PaymentEvent, StatusChange, Transaction, TransactionStatus,
};

const TRANSACTION_COLUMNS: &str = r#"
    id, transaction_number, customer_id, kind, status,
    subtotal_cents, tax_cents, discount_cents, total_cents, amount_paid_cents,
    note, reason, created_at, updated_at, paid_at
"#;

const LINE_ITEM_COLUMNS: &str = r#"
    id, transaction_id, kind, ref_id, sku_snapshot, name_snapshot,
    quantity, unit_price_cents, line_total_cents, tax_cents, taxable,
    position, created_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, transaction_id, kind, method, amount_cents, tendered_cents,
    change_cents, gift_card_id, note, created_at
"#;

const RESERVATION_COLUMNS: &str = r#"
    id, transaction_id, line_item_id, kind, ref_id, quantity,
    created_at, released_at
"#;

/// Repository for transaction reads.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Gets a transaction by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets line items in cart order.
    pub async fn get_items(&self, transaction_id: &str) -> DbResult<Vec<LineItem>> {
        let mut conn = self.pool.acquire().await?;
        items(&mut conn, transaction_id).await
    }

    /// Gets payment events in the order they were recorded.
    pub async fn get_payments(&self, transaction_id: &str) -> DbResult<Vec<PaymentEvent>> {
        let mut conn = self.pool.acquire().await?;
        payments(&mut conn, transaction_id).await
    }

    /// Gets every reservation, released or not.
    pub async fn get_reservations(
        &self,
        transaction_id: &str,
    ) -> DbResult<Vec<InventoryReservation>> {
        let sql = format!(
            "SELECT {} FROM inventory_reservations WHERE transaction_id = ?1 ORDER BY rowid",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InventoryReservation>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn get_status_history(&self, transaction_id: &str) -> DbResult<Vec<StatusChange>> {
        let rows = sqlx::query_as::<_, StatusChange>(
            r#"
            SELECT id, transaction_id, from_status, to_status, note, created_at
            FROM status_history
            WHERE transaction_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Sum of all payment events, reversals included.
    pub async fn net_paid_cents(&self, transaction_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        sum_payments(&mut conn, transaction_id).await
    }
}

// =============================================================================
// Connection-level operations (run inside a ledger transaction)
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Transaction>> {
    let sql = format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS);
    let row = sqlx::query_as::<_, Transaction>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row)
}

pub async fn insert_transaction(conn: &mut SqliteConnection, txn: &Transaction) -> DbResult<()> {
    debug!(
        id = %txn.id,
        transaction_number = %txn.transaction_number,
        kind = %txn.kind,
        total_cents = txn.total_cents,
        "Inserting transaction"
    );

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, transaction_number, customer_id, kind, status,
            subtotal_cents, tax_cents, discount_cents, total_cents, amount_paid_cents,
            note, reason, created_at, updated_at, paid_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15
        )
        "#,
    )
    .bind(&txn.id)
    .bind(&txn.transaction_number)
    .bind(&txn.customer_id)
    .bind(txn.kind)
    .bind(txn.status)
    .bind(txn.subtotal_cents)
    .bind(txn.tax_cents)
    .bind(txn.discount_cents)
    .bind(txn.total_cents)
    .bind(txn.amount_paid_cents)
    .bind(&txn.note)
    .bind(&txn.reason)
    .bind(txn.created_at)
    .bind(txn.updated_at)
    .bind(txn.paid_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes the mutable ledger columns of `txn`, but only if the stored
/// status is still `expected`.
///
/// Returns `false` when another writer got there first.
pub async fn update_state(
    conn: &mut SqliteConnection,
    txn: &Transaction,
    expected: TransactionStatus,
) -> DbResult<bool> {
    debug!(
        id = %txn.id,
        from = %expected,
        to = %txn.status,
        amount_paid_cents = txn.amount_paid_cents,
        "Updating transaction state"
    );

    let result = sqlx::query(
        r#"
        UPDATE transactions SET
            status = ?2,
            amount_paid_cents = ?3,
            reason = ?4,
            paid_at = ?5,
            updated_at = ?6
        WHERE id = ?1 AND status = ?7
        "#,
    )
    .bind(&txn.id)
    .bind(txn.status)
    .bind(txn.amount_paid_cents)
    .bind(&txn.reason)
    .bind(txn.paid_at)
    .bind(txn.updated_at)
    .bind(expected)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Inserts a line item.
///
/// ## Snapshot Pattern
/// SKU, name and unit price are copied from the catalog at checkout so the
/// record survives later price or name changes.
pub async fn insert_line_item(conn: &mut SqliteConnection, item: &LineItem) -> DbResult<()> {
    debug!(transaction_id = %item.transaction_id, ref_id = %item.ref_id, quantity = item.quantity, "Adding line item");

    sqlx::query(
        r#"
        INSERT INTO line_items (
            id, transaction_id, kind, ref_id, sku_snapshot, name_snapshot,
            quantity, unit_price_cents, line_total_cents, tax_cents, taxable,
            position, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&item.id)
    .bind(&item.transaction_id)
    .bind(item.kind)
    .bind(&item.ref_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.line_total_cents)
    .bind(item.tax_cents)
    .bind(item.taxable)
    .bind(item.position)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn items(conn: &mut SqliteConnection, transaction_id: &str) -> DbResult<Vec<LineItem>> {
    let sql = format!(
        "SELECT {} FROM line_items WHERE transaction_id = ?1 ORDER BY position",
        LINE_ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, LineItem>(&sql)
        .bind(transaction_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows)
}

/// Appends a payment event.
pub async fn insert_payment(conn: &mut SqliteConnection, event: &PaymentEvent) -> DbResult<()> {
    debug!(
        transaction_id = %event.transaction_id,
        method = %event.method,
        amount_cents = event.amount_cents,
        "Appending payment event"
    );

    sqlx::query(
        r#"
        INSERT INTO payment_events (
            id, transaction_id, kind, method, amount_cents, tendered_cents,
            change_cents, gift_card_id, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&event.id)
    .bind(&event.transaction_id)
    .bind(event.kind)
    .bind(event.method)
    .bind(event.amount_cents)
    .bind(event.tendered_cents)
    .bind(event.change_cents)
    .bind(&event.gift_card_id)
    .bind(&event.note)
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn payments(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<Vec<PaymentEvent>> {
    let sql = format!(
        "SELECT {} FROM payment_events WHERE transaction_id = ?1 ORDER BY rowid",
        PAYMENT_COLUMNS
    );
    let rows = sqlx::query_as::<_, PaymentEvent>(&sql)
        .bind(transaction_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows)
}

pub async fn sum_payments(conn: &mut SqliteConnection, transaction_id: &str) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payment_events WHERE transaction_id = ?1",
    )
    .bind(transaction_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

pub async fn insert_reservation(
    conn: &mut SqliteConnection,
    reservation: &InventoryReservation,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_reservations (
            id, transaction_id, line_item_id, kind, ref_id, quantity,
            created_at, released_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&reservation.id)
    .bind(&reservation.transaction_id)
    .bind(&reservation.line_item_id)
    .bind(reservation.kind)
    .bind(&reservation.ref_id)
    .bind(reservation.quantity)
    .bind(reservation.created_at)
    .bind(reservation.released_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Reservations not yet released.
pub async fn active_reservations(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<Vec<InventoryReservation>> {
    let sql = format!(
        "SELECT {} FROM inventory_reservations
         WHERE transaction_id = ?1 AND released_at IS NULL
         ORDER BY rowid",
        RESERVATION_COLUMNS
    );
    let rows = sqlx::query_as::<_, InventoryReservation>(&sql)
        .bind(transaction_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows)
}

/// Stamps one reservation as released. Returns `false` if it already was.
pub async fn mark_released(
    conn: &mut SqliteConnection,
    reservation_id: &str,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE inventory_reservations SET released_at = ?2 WHERE id = ?1 AND released_at IS NULL",
    )
    .bind(reservation_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Records a status transition. `from` is `None` for the creation entry.
pub async fn record_status_change(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    from: Option<TransactionStatus>,
    to: TransactionStatus,
    note: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<StatusChange> {
    let change = StatusChange {
        id: Uuid::new_v4().to_string(),
        transaction_id: transaction_id.to_string(),
        from_status: from,
        to_status: to,
        note: note.map(str::to_string),
        created_at: at,
    };

    sqlx::query(
        r#"
        INSERT INTO status_history (id, transaction_id, from_status, to_status, note, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&change.id)
    .bind(&change.transaction_id)
    .bind(change.from_status)
    .bind(change.to_status)
    .bind(&change.note)
    .bind(change.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(change)
}

/// Generates a receipt number: `TXN-YYYYMMDD-HHMMSS-XXXX`.
///
/// The suffix is four hex digits taken from a fresh UUID; the UNIQUE
/// constraint on the column catches the rare collision.
pub fn generate_transaction_number(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..4].to_uppercase();
    format!("TXN-{}-{}", at.format("%Y%m%d-%H%M%S"), suffix)
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
