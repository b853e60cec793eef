//! # Event Outbox Repository
//!
//! Durable queue of ledger notifications waiting for the event sink.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LEDGER OPERATION (e.g. process_payment)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE transactions SET status = 'paid' WHERE id = ?       │   │
//! │  │  2. INSERT INTO outbox_events (event_type, entity_id, payload) │   │
//! │  │     VALUES ('transaction.completed', ?, <event JSON>)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← both or neither                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EventSink::publish   (row is queued already claimed by the operation)  │
//! │     ok  → mark_delivered (delivered_at = now)                           │
//! │     err → mark_failed (attempts += 1, last_error, claim cleared)        │
//! │                                                                         │
//! │  Undelivered rows are retried by Ledger::redeliver_pending, which must  │
//! │  win claim() first. A claim older than the cutoff counts as abandoned.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use nautilus_core::OutboxEvent;

#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Undelivered events, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<OutboxEvent>> {
        let events = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, event_type, entity_id, payload, attempts, last_error,
                   created_at, attempted_at, claimed_at, delivered_at
            FROM outbox_events
            WHERE delivered_at IS NULL
            ORDER BY rowid
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<OutboxEvent>> {
        let event = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, event_type, entity_id, payload, attempts, last_error,
                   created_at, attempted_at, claimed_at, delivered_at
            FROM outbox_events
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Takes the right to deliver an undelivered event. Fails when another
    /// caller holds a claim made at or after `stale_before`.
    pub async fn claim(&self, id: &str, stale_before: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events SET claimed_at = ?2
            WHERE id = ?1
              AND delivered_at IS NULL
              AND (claimed_at IS NULL OR claimed_at < ?3)
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE outbox_events SET
                delivered_at = ?2,
                attempted_at = ?2,
                attempts = attempts + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed delivery attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE outbox_events SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3,
                claimed_at = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Queues `payload` as JSON on the given connection, claimed by the caller
/// for its first delivery.
///
/// ## Example
/// ```rust,ignore
/// let mut tx = db.begin().await?;
/// // ... state change ...
/// outbox::queue(&mut tx, "transaction.completed", &txn.id, &event).await?;
/// commit(tx).await?;
/// ```
pub async fn queue<T: Serialize>(
    conn: &mut SqliteConnection,
    event_type: &str,
    entity_id: &str,
    payload: &T,
) -> DbResult<OutboxEvent> {
    let now = Utc::now();
    let event = OutboxEvent {
        id: Uuid::new_v4().to_string(),
        event_type: event_type.to_string(),
        entity_id: entity_id.to_string(),
        payload: serde_json::to_string(payload)?,
        attempts: 0,
        last_error: None,
        created_at: now,
        attempted_at: None,
        claimed_at: Some(now),
        delivered_at: None,
    };

    debug!(event_type = %event_type, entity_id = %entity_id, "Queuing outbox event");

    sqlx::query(
        r#"
        INSERT INTO outbox_events (
            id, event_type, entity_id, payload,
            attempts, last_error, created_at, attempted_at, claimed_at, delivered_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&event.id)
    .bind(&event.event_type)
    .bind(&event.entity_id)
    .bind(&event.payload)
    .bind(event.attempts)
    .bind(&event.last_error)
    .bind(event.created_at)
    .bind(event.attempted_at)
    .bind(event.claimed_at)
    .bind(event.delivered_at)
    .execute(&mut *conn)
    .await?;

    Ok(event)
}
