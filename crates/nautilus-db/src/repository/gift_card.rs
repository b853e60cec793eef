//! # Gift Card Repository
//!
//! Stored-value cards and their balance ledger. Every balance change writes
//! a `gift_card_activity` row with the balance before and after, on the same
//! connection as the change itself.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use nautilus_core::{GiftCard, GiftCardActivity, GiftCardActivityKind, GiftCardStatus};

const GIFT_CARD_COLUMNS: &str = r#"
    id, card_number, customer_id, initial_balance_cents, current_balance_cents,
    status, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct GiftCardRepository {
    pool: SqlitePool,
}

impl GiftCardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GiftCardRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<GiftCard>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Looks a card up by the number printed on it.
    pub async fn get_by_number(&self, card_number: &str) -> DbResult<Option<GiftCard>> {
        let sql = format!(
            "SELECT {} FROM gift_cards WHERE card_number = ?1",
            GIFT_CARD_COLUMNS
        );
        let card = sqlx::query_as::<_, GiftCard>(&sql)
            .bind(card_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(card)
    }

    /// Balance history, oldest first.
    pub async fn activity(&self, gift_card_id: &str) -> DbResult<Vec<GiftCardActivity>> {
        let rows = sqlx::query_as::<_, GiftCardActivity>(
            r#"
            SELECT id, gift_card_id, kind, amount_cents, balance_before_cents,
                   balance_after_cents, transaction_id, created_at
            FROM gift_card_activity
            WHERE gift_card_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(gift_card_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<GiftCard>> {
    let sql = format!("SELECT {} FROM gift_cards WHERE id = ?1", GIFT_CARD_COLUMNS);
    let card = sqlx::query_as::<_, GiftCard>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(card)
}

/// Inserts a new card together with its `issue` activity row.
pub async fn insert(conn: &mut SqliteConnection, card: &GiftCard) -> DbResult<GiftCardActivity> {
    debug!(id = %card.id, balance_cents = card.current_balance_cents, "Issuing gift card");

    sqlx::query(
        r#"
        INSERT INTO gift_cards (
            id, card_number, customer_id, initial_balance_cents, current_balance_cents,
            status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&card.id)
    .bind(&card.card_number)
    .bind(&card.customer_id)
    .bind(card.initial_balance_cents)
    .bind(card.current_balance_cents)
    .bind(card.status)
    .bind(card.created_at)
    .bind(card.updated_at)
    .execute(&mut *conn)
    .await?;

    let activity = GiftCardActivity {
        id: Uuid::new_v4().to_string(),
        gift_card_id: card.id.clone(),
        kind: GiftCardActivityKind::Issue,
        amount_cents: card.initial_balance_cents,
        balance_before_cents: 0,
        balance_after_cents: card.current_balance_cents,
        transaction_id: None,
        created_at: card.created_at,
    };
    insert_activity(conn, &activity).await?;

    Ok(activity)
}

/// Moves `amount_cents` (positive) on or off a card.
///
/// - `Redeem` subtracts, guarded by `status = 'active'` and a sufficient
///   balance; returns `None` if the guard fails.
/// - `Reload` and `Credit` add. A reload also reactivates the card.
/// - `Issue` is handled by [`insert`] and is rejected here with `None`.
pub async fn adjust_balance(
    conn: &mut SqliteConnection,
    gift_card_id: &str,
    kind: GiftCardActivityKind,
    amount_cents: i64,
    transaction_id: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<Option<GiftCardActivity>> {
    let sql = match kind {
        GiftCardActivityKind::Redeem => {
            r#"
            UPDATE gift_cards
               SET current_balance_cents = current_balance_cents - ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'active' AND current_balance_cents >= ?2
            RETURNING current_balance_cents
            "#
        }
        GiftCardActivityKind::Reload => {
            r#"
            UPDATE gift_cards
               SET current_balance_cents = current_balance_cents + ?2, updated_at = ?3,
                   status = 'active'
             WHERE id = ?1
            RETURNING current_balance_cents
            "#
        }
        GiftCardActivityKind::Credit => {
            r#"
            UPDATE gift_cards
               SET current_balance_cents = current_balance_cents + ?2, updated_at = ?3
             WHERE id = ?1
            RETURNING current_balance_cents
            "#
        }
        GiftCardActivityKind::Issue => return Ok(None),
    };

    let after: Option<i64> = sqlx::query_scalar(sql)
        .bind(gift_card_id)
        .bind(amount_cents)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(after) = after else {
        debug!(gift_card_id = %gift_card_id, kind = ?kind, amount_cents, "Gift card update refused");
        return Ok(None);
    };

    let before = match kind {
        GiftCardActivityKind::Redeem => after + amount_cents,
        _ => after - amount_cents,
    };

    let activity = GiftCardActivity {
        id: Uuid::new_v4().to_string(),
        gift_card_id: gift_card_id.to_string(),
        kind,
        amount_cents,
        balance_before_cents: before,
        balance_after_cents: after,
        transaction_id: transaction_id.map(str::to_string),
        created_at: at,
    };
    insert_activity(conn, &activity).await?;

    debug!(gift_card_id = %gift_card_id, kind = ?kind, before, after, "Gift card balance changed");
    Ok(Some(activity))
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    gift_card_id: &str,
    status: GiftCardStatus,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE gift_cards SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(gift_card_id)
        .bind(status)
        .bind(at)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

async fn insert_activity(conn: &mut SqliteConnection, activity: &GiftCardActivity) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO gift_card_activity (
            id, gift_card_id, kind, amount_cents, balance_before_cents,
            balance_after_cents, transaction_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&activity.id)
    .bind(&activity.gift_card_id)
    .bind(activity.kind)
    .bind(activity.amount_cents)
    .bind(activity.balance_before_cents)
    .bind(activity.balance_after_cents)
    .bind(&activity.transaction_id)
    .bind(activity.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Generates a 16-digit card number from a fresh UUID.
pub fn generate_card_number() -> String {
    let n = Uuid::new_v4().as_u128() % 10_u128.pow(16);
    format!("{:016}", n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::commit;
    use crate::{Database, DbConfig};

    fn card(id: &str, balance: i64) -> GiftCard {
        let now = Utc::now();
        GiftCard {
            id: id.to_string(),
            card_number: generate_card_number(),
            customer_id: None,
            initial_balance_cents: balance,
            current_balance_cents: balance,
            status: GiftCardStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_card_number_is_sixteen_digits() {
        for _ in 0..20 {
            let number = generate_card_number();
            assert_eq!(number.len(), 16);
            assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_issue_redeem_credit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gc = card("gc-1", 5000);

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &gc).await.unwrap();

        let redeem = adjust_balance(&mut tx, "gc-1", GiftCardActivityKind::Redeem, 2000, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(redeem.balance_before_cents, 5000);
        assert_eq!(redeem.balance_after_cents, 3000);

        // more than the balance: refused, nothing written
        let refused = adjust_balance(&mut tx, "gc-1", GiftCardActivityKind::Redeem, 3001, None, Utc::now())
            .await
            .unwrap();
        assert!(refused.is_none());

        adjust_balance(&mut tx, "gc-1", GiftCardActivityKind::Credit, 2000, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        commit(tx).await.unwrap();

        let repo = db.gift_cards();
        let stored = repo.get_by_number(&gc.card_number).await.unwrap().unwrap();
        assert_eq!(stored.current_balance_cents, 5000);

        let kinds: Vec<_> = repo.activity("gc-1").await.unwrap().into_iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                GiftCardActivityKind::Issue,
                GiftCardActivityKind::Redeem,
                GiftCardActivityKind::Credit
            ]
        );
    }

    #[tokio::test]
    async fn test_inactive_card_cannot_be_redeemed_until_reloaded() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, &card("gc-2", 1000)).await.unwrap();
        set_status(&mut tx, "gc-2", GiftCardStatus::Inactive, Utc::now()).await.unwrap();

        let refused = adjust_balance(&mut tx, "gc-2", GiftCardActivityKind::Redeem, 100, None, Utc::now())
            .await
            .unwrap();
        assert!(refused.is_none());

        adjust_balance(&mut tx, "gc-2", GiftCardActivityKind::Reload, 500, None, Utc::now())
            .await
            .unwrap()
            .unwrap();
        commit(tx).await.unwrap();

        let stored = db.gift_cards().get_by_id("gc-2").await.unwrap().unwrap();
        assert_eq!(stored.status, GiftCardStatus::Active);
        assert_eq!(stored.current_balance_cents, 1500);
    }
}
