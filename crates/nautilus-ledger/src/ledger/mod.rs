//! # Ledger Service
//!
//! The entry point for everything that moves money or stock.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  write_gate.lock()          one mutating operation at a time            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │    load transaction, check status (nautilus-core rules)                 │
//! │    write payment events / reservations / catalog deltas                 │
//! │    guarded UPDATE transactions ... WHERE status = <expected>            │
//! │    INSERT status_history, INSERT outbox_events                          │
//! │  COMMIT                     any error before this point rolls back      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EventSink::publish         failures are logged, never returned         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads go straight to the pool and see committed state only.

mod checkout;
mod delivery;
mod gift_cards;
mod payment;
mod queries;
mod reversal;

pub use checkout::CheckoutRequest;
pub use delivery::{DeliveryReport, MAX_DELIVERY_ATTEMPTS};
pub use payment::{PaymentReceipt, PaymentRequest};
pub use queries::Balance;
pub use reversal::RefundReceipt;

use std::sync::Arc;

use sqlx::SqliteConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use nautilus_core::{OutboxEvent, TaxRate, Transaction, TransactionStatus};
use nautilus_db::repository::{outbox, transaction as txn_store};
use nautilus_db::Database;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventSink, LedgerEvent, LogSink};

/// The order/payment ledger.
///
/// Cheap to clone; clones share the pool, the sink and the write gate.
///
/// ## Example
/// ```rust,ignore
/// let ledger = Ledger::open(&LedgerConfig::from_env()?).await?;
///
/// let id = ledger
///     .create_transaction(CheckoutRequest::sale(vec![
///         CartLine::new(ItemKind::Product, "mask-01", 2),
///     ]))
///     .await?;
///
/// ledger.process_payment(&id, PaymentRequest::cash(Money::from_cents(2160))).await?;
/// ```
#[derive(Clone)]
pub struct Ledger {
    db: Database,
    tax_rate: TaxRate,
    outbox_batch_size: u32,
    sink: Arc<dyn EventSink>,
    write_gate: Arc<Mutex<()>>,
}

impl Ledger {
    /// Opens the database named in `config` (running migrations) and builds a
    /// ledger that logs its events.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Ledger::new(db, config))
    }

    pub fn new(db: Database, config: &LedgerConfig) -> Self {
        info!(tax_bps = config.tax_rate.bps(), "Ledger ready");
        Ledger {
            db,
            tax_rate: config.tax_rate,
            outbox_batch_size: config.outbox_batch_size,
            sink: Arc::new(LogSink),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Replaces the event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    /// Hands a committed event to the sink and records the outcome on its
    /// outbox row. The row was queued claimed, so redelivery leaves it alone
    /// until this finishes.
    async fn notify(&self, queued: &OutboxEvent, event: &LedgerEvent) {
        let outcome = self.sink.publish(event);
        let _gate = self.write_gate.lock().await;
        match outcome {
            Ok(()) => {
                debug!(event_type = event.event_type(), outbox_id = %queued.id, "Event delivered");
                if let Err(e) = self.db.outbox().mark_delivered(&queued.id).await {
                    warn!(outbox_id = %queued.id, error = %e, "Could not mark event delivered");
                }
            }
            Err(e) => {
                warn!(
                    event_type = event.event_type(),
                    outbox_id = %queued.id,
                    error = %e,
                    "Event sink failed; left for redelivery"
                );
                if let Err(db_err) = self.db.outbox().mark_failed(&queued.id, &e.to_string()).await {
                    warn!(outbox_id = %queued.id, error = %db_err, "Could not record failed delivery");
                }
            }
        }
    }
}

/// Loads a transaction on the unit-of-work connection.
async fn load(conn: &mut SqliteConnection, id: &str) -> LedgerResult<Transaction> {
    txn_store::fetch(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Transaction", id))
}

/// Writes the new state of `txn`, failing if its stored status moved away
/// from `expected` since it was loaded.
async fn save(
    conn: &mut SqliteConnection,
    txn: &Transaction,
    expected: TransactionStatus,
    operation: &str,
) -> LedgerResult<()> {
    if !txn_store::update_state(conn, txn, expected).await? {
        return Err(LedgerError::InvalidState {
            transaction_id: txn.id.clone(),
            status: expected,
            operation: operation.to_string(),
        });
    }
    Ok(())
}

/// Queues `event` in the outbox on the unit-of-work connection.
async fn enqueue(conn: &mut SqliteConnection, event: &LedgerEvent) -> LedgerResult<OutboxEvent> {
    let queued = outbox::queue(conn, event.event_type(), event.transaction_id(), event).await?;
    Ok(queued)
}
