//! # Outbox Redelivery
//!
//! Retries events the sink refused when their operation committed.
//!
//! Each event is claimed before it is published, so a pass never hands the
//! sink an event that its own operation (or another pass) is delivering.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Ledger;
use crate::error::LedgerResult;
use crate::events::LedgerEvent;

/// Events are given up on after this many failed deliveries.
pub const MAX_DELIVERY_ATTEMPTS: i64 = 10;

/// A delivery claim older than this is treated as abandoned.
const CLAIM_TIMEOUT_SECS: i64 = 60;

/// What one redelivery pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Over the attempt limit, or with a payload that no longer parses.
    pub skipped: usize,
    /// Being delivered by someone else.
    pub in_flight: usize,
}

impl Ledger {
    /// Publishes up to `limit` undelivered outbox events, oldest first
    /// (`None` uses the configured batch size).
    ///
    /// Sink failures are recorded on the event and counted in the report,
    /// never returned.
    pub async fn redeliver_pending(&self, limit: Option<u32>) -> LedgerResult<DeliveryReport> {
        let limit = limit.unwrap_or(self.outbox_batch_size);
        let pending = self.db.outbox().get_pending(limit).await?;

        if pending.is_empty() {
            debug!("No pending ledger events");
            return Ok(DeliveryReport::default());
        }

        info!(count = pending.len(), "Redelivering ledger events");

        let (retryable, exhausted): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|e| e.attempts < MAX_DELIVERY_ATTEMPTS);

        let mut report = DeliveryReport {
            skipped: exhausted.len(),
            ..DeliveryReport::default()
        };
        for entry in &exhausted {
            warn!(
                outbox_id = %entry.id,
                event_type = %entry.event_type,
                attempts = entry.attempts,
                "Skipping event that exceeded max delivery attempts"
            );
        }

        let stale_before = Utc::now() - Duration::seconds(CLAIM_TIMEOUT_SECS);
        for entry in retryable {
            let _gate = self.write_gate.lock().await;
            if !self.db.outbox().claim(&entry.id, stale_before).await? {
                debug!(outbox_id = %entry.id, "Event already being delivered");
                report.in_flight += 1;
                continue;
            }

            let event: LedgerEvent = match serde_json::from_str(&entry.payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(outbox_id = %entry.id, error = %e, "Unreadable event payload");
                    self.db.outbox().mark_failed(&entry.id, &e.to_string()).await?;
                    report.skipped += 1;
                    continue;
                }
            };

            match self.sink.publish(&event) {
                Ok(()) => {
                    self.db.outbox().mark_delivered(&entry.id).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    debug!(outbox_id = %entry.id, error = %e, "Redelivery failed");
                    self.db.outbox().mark_failed(&entry.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            in_flight = report.in_flight,
            "Redelivery pass finished"
        );
        Ok(report)
    }
}
