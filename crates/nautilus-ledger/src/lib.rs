//! # nautilus-ledger: Order/Payment Ledger for Nautilus
//!
//! Records what the dive shop sold, what the customer paid, and how either
//! was undone: retail products, course seats, rental units and trip slots
//! share one ledger.
//!
//! ## Components
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ledger (ledger/)                               │
//! │                                                                         │
//! │  checkout.rs   create_transaction      price cart, pending txn          │
//! │  payment.rs    process_payment         settle, reserve, → paid          │
//! │                record_installment      layaway top-ups                  │
//! │  reversal.rs   void_transaction        reverse, release, → voided       │
//! │                refund_transaction      partial / full refund            │
//! │  gift_cards.rs issue / reload / deactivate / lookup                     │
//! │  queries.rs    get_transaction, get_transaction_items, balance, ...     │
//! │  delivery.rs   redeliver_pending       retry refused events             │
//! │                                                                         │
//! │  events.rs     LedgerEvent, EventSink (LogSink, ChannelSink)            │
//! │  config.rs     LedgerConfig from NAUTILUS_* env vars                    │
//! │  error.rs      LedgerError + ErrorCode                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! use nautilus_ledger::{CheckoutRequest, Ledger, LedgerConfig, PaymentRequest};
//! use nautilus_core::{checkout::CartLine, ItemKind, Money};
//!
//! nautilus_ledger::init_tracing();
//! let ledger = Ledger::open(&LedgerConfig::from_env()?).await?;
//!
//! let id = ledger
//!     .create_transaction(CheckoutRequest::sale(vec![CartLine::new(ItemKind::Product, "mask-01", 2)]))
//!     .await?;
//! let receipt = ledger.process_payment(&id, PaymentRequest::cash(Money::from_cents(3000))).await?;
//! println!("change: {}", receipt.change);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;

pub use config::{ConfigError, LedgerConfig};
pub use error::{ErrorCode, LedgerError, LedgerResult};
pub use events::{ChannelSink, EventSink, LedgerEvent, LogSink, SinkError};
pub use ledger::{
    Balance, CheckoutRequest, DeliveryReport, Ledger, PaymentReceipt, PaymentRequest,
    RefundReceipt, MAX_DELIVERY_ATTEMPTS,
};

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=nautilus_ledger=trace` - Trace the ledger only
/// - Default: INFO, DEBUG for nautilus crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nautilus=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}
