//! # nautilus-core: Pure Ledger Logic for Nautilus
//!
//! Everything the dive-shop ledger decides without touching storage lives
//! here: how much a cart costs, whether a tender settles it, and which status
//! transitions are legal.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Nautilus Ledger Layers                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  nautilus-ledger   Ledger service (checkout / pay / void /      │   │
//! │  │                    refund), config, event sink                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │  nautilus-db       SQLite pool, migrations, repositories        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ nautilus-core (THIS CRATE) ★                    │   │
//! │  │   money · types · checkout · settlement · lifecycle · validation│   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS IN CALCULATIONS         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` in integer cents
//! - [`types`] - Transaction, LineItem, PaymentEvent, reservations, gift cards
//! - [`checkout`] - Subtotal / tax / discount / total computation
//! - [`settlement`] - Tender, installment and refund rules
//! - [`lifecycle`] - Transaction status machine
//! - [`validation`] - Input checks
//! - [`error`] - `CoreError` and `ValidationError`
//!
//! ## Example
//!
//! ```rust
//! use nautilus_core::checkout::{compute_totals, PricedLine};
//! use nautilus_core::{ItemKind, Money, TaxRate};
//!
//! let lines = vec![PricedLine {
//!     kind: ItemKind::Product,
//!     ref_id: "mask-01".to_string(),
//!     sku: "MASK-01".to_string(),
//!     name: "Low volume mask".to_string(),
//!     unit_price: Money::from_cents(1000),
//!     quantity: 2,
//!     taxable: true,
//! }];
//!
//! let totals = compute_totals(&lines, TaxRate::from_bps(800), None).unwrap();
//! assert_eq!(totals.subtotal.cents(), 2000);
//! assert_eq!(totals.tax.cents(), 160);
//! assert_eq!(totals.total.cents(), 2160);
//! ```

pub mod checkout;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod settlement;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

/// Maximum lines allowed in a single checkout.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single line.
///
/// Catches fat-finger entries (1000 instead of 10) at the till.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of a void/refund reason or a payment note.
pub const MAX_NOTE_LENGTH: usize = 500;
