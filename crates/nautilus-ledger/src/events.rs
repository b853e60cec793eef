//! # Ledger Events
//!
//! Notifications emitted after a ledger operation commits. Receipt printing,
//! course rosters and customer emails hang off these; the ledger itself never
//! depends on them being delivered.
//!
//! ## Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  operation tx ── INSERT outbox_events ── COMMIT                         │
//! │                                            │                            │
//! │                                            ▼                            │
//! │                                   EventSink::publish(&event)            │
//! │                                     │              │                    │
//! │                                    Ok             Err                   │
//! │                                     │              │                    │
//! │                              mark_delivered   warn! + mark_failed       │
//! │                                                    │                    │
//! │                                   Ledger::redeliver_pending retries     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use ts_rs::TS;

use nautilus_core::{TransactionKind, TransactionStatus};

/// Something that happened to a transaction.
///
/// Serialized with an `event` tag; the tag doubles as the outbox
/// `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    #[serde(rename = "transaction.created")]
    TransactionCreated {
        transaction_id: String,
        transaction_number: String,
        kind: TransactionKind,
        customer_id: Option<String>,
        total_cents: i64,
    },

    /// Payment accepted, stock reserved.
    #[serde(rename = "transaction.completed")]
    TransactionCompleted {
        transaction_id: String,
        kind: TransactionKind,
        customer_id: Option<String>,
        total_cents: i64,
        amount_paid_cents: i64,
    },

    #[serde(rename = "transaction.installment_recorded")]
    InstallmentRecorded {
        transaction_id: String,
        amount_cents: i64,
        balance_due_cents: i64,
    },

    #[serde(rename = "transaction.voided")]
    TransactionVoided {
        transaction_id: String,
        previous_status: TransactionStatus,
        reversed_cents: i64,
        reason: Option<String>,
    },

    #[serde(rename = "transaction.refunded")]
    TransactionRefunded {
        transaction_id: String,
        amount_cents: i64,
        /// `true` when the refund emptied the transaction.
        full: bool,
        reason: Option<String>,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::TransactionCreated { .. } => "transaction.created",
            LedgerEvent::TransactionCompleted { .. } => "transaction.completed",
            LedgerEvent::InstallmentRecorded { .. } => "transaction.installment_recorded",
            LedgerEvent::TransactionVoided { .. } => "transaction.voided",
            LedgerEvent::TransactionRefunded { .. } => "transaction.refunded",
        }
    }

    pub fn transaction_id(&self) -> &str {
        match self {
            LedgerEvent::TransactionCreated { transaction_id, .. }
            | LedgerEvent::TransactionCompleted { transaction_id, .. }
            | LedgerEvent::InstallmentRecorded { transaction_id, .. }
            | LedgerEvent::TransactionVoided { transaction_id, .. }
            | LedgerEvent::TransactionRefunded { transaction_id, .. } => transaction_id,
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event receiver is closed")]
    Closed,

    #[error("event queue is full")]
    Full,

    #[error("event rejected: {0}")]
    Rejected(String),
}

/// Receives ledger events after commit.
///
/// Called on the task that ran the operation, so implementations must not
/// block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError>;
}

/// Default sink: writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        info!(
            event_type = event.event_type(),
            transaction_id = %event.transaction_id(),
            "Ledger event"
        );
        Ok(())
    }
}

/// Forwards events to a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<LedgerEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LedgerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelSink { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
