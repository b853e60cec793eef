//! # nautilus-db: Database Layer for the Nautilus Ledger
//!
//! SQLite storage for the ledger, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Nautilus Data Flow                               │
//! │                                                                         │
//! │  Ledger::process_payment                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   nautilus-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ catalog        │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ transaction    │   │ 001_initial_ │   │   │
//! │  │   │ begin/commit  │    │ gift_card      │   │   schema.sql │   │   │
//! │  │   │               │    │ outbox         │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nautilus_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./nautilus.db")).await?;
//! let txn = db.transactions().get_by_id(&id).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{commit, Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::gift_card::GiftCardRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::transaction::TransactionRepository;
