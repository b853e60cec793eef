//! # Domain Types
//!
//! The records the ledger stores and the small enums that classify them.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Records                                  │
//! │                                                                         │
//! │  ┌─────────────────┐ 1   * ┌─────────────────┐ 1   1 ┌───────────────┐ │
//! │  │  Transaction    │──────►│    LineItem     │──────►│  Inventory    │ │
//! │  │  ─────────────  │       │  ─────────────  │       │  Reservation  │ │
//! │  │  kind / status  │       │  kind + ref_id  │       │  (when paid)  │ │
//! │  │  totals (cents) │       │  unit price     │       └───────────────┘ │
//! │  └────────┬────────┘       │  (snapshotted)  │                          │
//! │           │ 1              └─────────────────┘                          │
//! │           │                                                             │
//! │           │ *   ┌─────────────────┐      ┌─────────────────┐            │
//! │           ├────►│  PaymentEvent   │─────►│    GiftCard     │            │
//! │           │     │  append-only    │ 0..1 │  balance ledger │            │
//! │           │     └─────────────────┘      └─────────────────┘            │
//! │           │ *   ┌─────────────────┐                                     │
//! │           └────►│  StatusChange   │                                     │
//! │                 └─────────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids are UUID v4 strings. Money columns are `*_cents: i64`; accessor
//! methods wrap them in [`Money`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points: 800 bps = 8.00%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (8.25 → 825 bps).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Item Kind
// =============================================================================

/// What a line item sells. Every kind is capacity-limited: products have
/// stock, courses have seats, rentals have units and trips have slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Product,
    CourseSeat,
    RentalUnit,
    TripSlot,
}

impl ItemKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::CourseSeat => "course_seat",
            ItemKind::RentalUnit => "rental_unit",
            ItemKind::TripSlot => "trip_slot",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction Kind & Status
// =============================================================================

/// How a transaction is settled.
///
/// - `Sale`: must be paid in full in one tender.
/// - `Layaway`: any deposit (even zero) commits the goods; the rest is paid
///   in installments.
/// - `Quote`: informational; never reserves stock and cannot be paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Quote,
    Layaway,
}

impl TransactionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Sale => "sale",
            TransactionKind::Quote => "quote",
            TransactionKind::Layaway => "layaway",
        }
    }

    /// Whether checkout has to verify availability for this kind.
    #[inline]
    pub const fn holds_inventory(&self) -> bool {
        !matches!(self, TransactionKind::Quote)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger status of a transaction. See [`crate::lifecycle`] for the legal
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created by checkout, awaiting payment.
    Pending,
    /// Payment accepted and inventory reserved.
    Paid,
    /// Cancelled; reservations released and money reversed.
    Voided,
    /// Fully refunded; reservations released.
    Refunded,
    /// Stored for compatibility with older records; no ledger operation
    /// moves a transaction here.
    Failed,
}

impl TransactionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Voided => "voided",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Pending
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method & Kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// Card on an external terminal.
    Card,
    /// Store gift card; debits the card balance.
    GiftCard,
    Other,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::GiftCard => "gift_card",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Money received (positive amount).
    Payment,
    /// Money returned by a void or refund (negative amount).
    Reversal,
}

// =============================================================================
// Catalog Item
// =============================================================================

/// A sellable unit as seen by checkout: price plus remaining capacity.
///
/// Keyed by `(kind, ref_id)`; the ref id is the id of the product, course
/// schedule, rental unit or trip schedule in the shop's own tables.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CatalogItem {
    pub kind: ItemKind,
    pub ref_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    /// Units that can still be committed (stock on hand, open seats, ...).
    pub available_quantity: i64,
    /// Whether the configured sales tax applies.
    pub taxable: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Checks if `quantity` more units can be committed.
    #[inline]
    pub fn can_supply(&self, quantity: i64) -> bool {
        self.available_quantity >= quantity
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// One sale, quote or layaway with a single ledger status.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    /// Human-readable number printed on receipts.
    pub transaction_number: String,
    /// `None` for walk-in customers.
    pub customer_id: Option<String>,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    /// Always `subtotal + tax - discount`.
    pub total_cents: i64,
    /// Net of reversals; equals the sum of the transaction's payment events.
    pub amount_paid_cents: i64,
    pub note: Option<String>,
    /// Why the transaction was voided or refunded.
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// Outstanding balance, never negative.
    pub fn balance_due(&self) -> Money {
        let due = self.total() - self.amount_paid();
        if due.is_negative() {
            Money::zero()
        } else {
            due
        }
    }

    #[inline]
    pub fn is_walk_in(&self) -> bool {
        self.customer_id.is_none()
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// A priced, quantity-bound line. Name, SKU and price are frozen at checkout
/// and never re-read from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub transaction_id: String,
    pub kind: ItemKind,
    pub ref_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// unit price × quantity, before tax.
    pub line_total_cents: i64,
    pub tax_cents: i64,
    pub taxable: bool,
    /// Position in the cart, used to keep the original line order.
    pub position: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment Event
// =============================================================================

/// Money applied to or returned from a transaction. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentEvent {
    pub id: String,
    pub transaction_id: String,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    /// Applied amount; negative for reversals.
    pub amount_cents: i64,
    /// What the customer handed over (payments only).
    pub tendered_cents: Option<i64>,
    /// Change returned (payments only).
    pub change_cents: Option<i64>,
    pub gift_card_id: Option<String>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PaymentEvent {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Inventory Reservation
// =============================================================================

/// Capacity committed to one line of a paid transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryReservation {
    pub id: String,
    pub transaction_id: String,
    pub line_item_id: String,
    pub kind: ItemKind,
    pub ref_id: String,
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Set when a void or full refund gives the capacity back.
    #[ts(as = "Option<String>")]
    pub released_at: Option<DateTime<Utc>>,
}

impl InventoryReservation {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}

// =============================================================================
// Status History
// =============================================================================

/// One recorded status transition.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StatusChange {
    pub id: String,
    pub transaction_id: String,
    /// `None` for the creation entry.
    pub from_status: Option<TransactionStatus>,
    pub to_status: TransactionStatus,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Gift Cards
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GiftCardStatus {
    Active,
    Inactive,
}

/// A stored-value card.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct GiftCard {
    pub id: String,
    /// 16-digit number printed on the card.
    pub card_number: String,
    pub customer_id: Option<String>,
    pub initial_balance_cents: i64,
    pub current_balance_cents: i64,
    pub status: GiftCardStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl GiftCard {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.current_balance_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GiftCardActivityKind {
    Issue,
    Reload,
    /// Spent on a transaction.
    Redeem,
    /// Returned by a void or refund.
    Credit,
}

/// One balance movement on a gift card, with before/after snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct GiftCardActivity {
    pub id: String,
    pub gift_card_id: String,
    pub kind: GiftCardActivityKind,
    pub amount_cents: i64,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub transaction_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Outbox
// =============================================================================

/// A notification waiting to be handed to the event sink.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OutboxEvent {
    pub id: String,
    /// e.g. `"transaction.completed"`.
    pub event_type: String,
    pub entity_id: String,
    /// JSON body.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    /// Set while someone is delivering the event.
    #[ts(as = "Option<String>")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
}
