//! # Repository Module
//!
//! SQL for the ledger tables, one module per aggregate.
//!
//! ## Two Access Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repository structs (hold the pool)     Free functions (take a conn)    │
//! │  ───────────────────────────────────    ──────────────────────────────  │
//! │  db.transactions().get_by_id(id)        transaction::fetch(&mut tx, id) │
//! │  db.catalog().lookup(kind, ref_id)      catalog::reserve(&mut tx, ...)  │
//! │  db.gift_cards().get_by_number(n)       gift_card::adjust_balance(...)  │
//! │  db.outbox().get_pending(50)            outbox::queue(&mut tx, ...)     │
//! │                                                                         │
//! │  Reads from any pooled connection.      Run inside a ledger operation's │
//! │                                         database transaction, so every  │
//! │                                         write commits or none does.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Prices and remaining capacity
//! - [`TransactionRepository`](transaction::TransactionRepository) - Transactions, lines, payments, reservations, history
//! - [`GiftCardRepository`](gift_card::GiftCardRepository) - Cards and balance activity
//! - [`OutboxRepository`](outbox::OutboxRepository) - Pending notifications

pub mod catalog;
pub mod gift_card;
pub mod outbox;
pub mod transaction;
