//! # Catalog Repository
//!
//! Price and remaining capacity for everything the shop sells.
//!
//! ## Capacity Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve(kind, ref_id, 2)                                               │
//! │                                                                         │
//! │  UPDATE catalog_items                                                   │
//! │     SET available_quantity = available_quantity - 2                     │
//! │   WHERE kind = ? AND ref_id = ? AND is_active = 1                       │
//! │     AND available_quantity >= 2          ← guard                        │
//! │                                                                         │
//! │  1 row  → reserved                                                      │
//! │  0 rows → not enough left (or item gone); caller fails the operation    │
//! │                                                                         │
//! │  release(kind, ref_id, 2) adds the delta back. No absolute writes, so   │
//! │  a concurrent writer's decrement is never overwritten.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use nautilus_core::{CatalogItem, ItemKind};

const CATALOG_COLUMNS: &str = r#"
    kind, ref_id, sku, name, unit_price_cents, available_quantity,
    taxable, is_active, created_at, updated_at
"#;

/// Repository for catalog reads and seeding.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Finds an active item. Inactive items are treated as absent.
    pub async fn lookup(&self, kind: ItemKind, ref_id: &str) -> DbResult<Option<CatalogItem>> {
        let mut conn = self.pool.acquire().await?;
        lookup(&mut conn, kind, ref_id).await
    }

    /// Gets an item regardless of its active flag.
    pub async fn get(&self, kind: ItemKind, ref_id: &str) -> DbResult<Option<CatalogItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, kind, ref_id).await
    }

    pub async fn insert(&self, item: &CatalogItem) -> DbResult<()> {
        debug!(kind = %item.kind, ref_id = %item.ref_id, sku = %item.sku, "Inserting catalog item");

        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                kind, ref_id, sku, name, unit_price_cents, available_quantity,
                taxable, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(item.kind)
        .bind(&item.ref_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.unit_price_cents)
        .bind(item.available_quantity)
        .bind(item.taxable)
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists active items of one kind, by SKU.
    pub async fn list_by_kind(&self, kind: ItemKind) -> DbResult<Vec<CatalogItem>> {
        let sql = format!(
            "SELECT {} FROM catalog_items WHERE kind = ?1 AND is_active = 1 ORDER BY sku",
            CATALOG_COLUMNS
        );
        let items = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    pub async fn set_active(&self, kind: ItemKind, ref_id: &str, active: bool) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE catalog_items SET is_active = ?3, updated_at = ?4 WHERE kind = ?1 AND ref_id = ?2",
        )
        .bind(kind)
        .bind(ref_id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Counts all catalog rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Connection-level operations (run inside a ledger transaction)
// =============================================================================

/// Finds an active item on the given connection.
pub async fn lookup(
    conn: &mut SqliteConnection,
    kind: ItemKind,
    ref_id: &str,
) -> DbResult<Option<CatalogItem>> {
    let sql = format!(
        "SELECT {} FROM catalog_items WHERE kind = ?1 AND ref_id = ?2 AND is_active = 1",
        CATALOG_COLUMNS
    );
    let item = sqlx::query_as::<_, CatalogItem>(&sql)
        .bind(kind)
        .bind(ref_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(item)
}

/// Gets an item on the given connection, active or not.
pub async fn fetch(
    conn: &mut SqliteConnection,
    kind: ItemKind,
    ref_id: &str,
) -> DbResult<Option<CatalogItem>> {
    let sql = format!(
        "SELECT {} FROM catalog_items WHERE kind = ?1 AND ref_id = ?2",
        CATALOG_COLUMNS
    );
    let item = sqlx::query_as::<_, CatalogItem>(&sql)
        .bind(kind)
        .bind(ref_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(item)
}

/// Takes `quantity` units if at least that many remain.
///
/// Returns `false` (and changes nothing) when the guard fails.
pub async fn reserve(
    conn: &mut SqliteConnection,
    kind: ItemKind,
    ref_id: &str,
    quantity: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE catalog_items
           SET available_quantity = available_quantity - ?3,
               updated_at = ?4
         WHERE kind = ?1 AND ref_id = ?2 AND is_active = 1
           AND available_quantity >= ?3
        "#,
    )
    .bind(kind)
    .bind(ref_id)
    .bind(quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let reserved = result.rows_affected() == 1;
    debug!(kind = %kind, ref_id = %ref_id, quantity, reserved, "Reserve capacity");
    Ok(reserved)
}

/// Gives `quantity` units back. Applies to inactive items too.
pub async fn release(
    conn: &mut SqliteConnection,
    kind: ItemKind,
    ref_id: &str,
    quantity: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE catalog_items
           SET available_quantity = available_quantity + ?3,
               updated_at = ?4
         WHERE kind = ?1 AND ref_id = ?2
        "#,
    )
    .bind(kind)
    .bind(ref_id)
    .bind(quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    debug!(kind = %kind, ref_id = %ref_id, quantity, "Released capacity");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn item(kind: ItemKind, ref_id: &str, sku: &str, available: i64) -> CatalogItem {
        let now = Utc::now();
        CatalogItem {
            kind,
            ref_id: ref_id.to_string(),
            sku: sku.to_string(),
            name: format!("{} item", sku),
            unit_price_cents: 1000,
            available_quantity: available,
            taxable: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        repo.insert(&item(ItemKind::Product, "mask-1", "MASK-1", 5)).await.unwrap();

        let found = repo.lookup(ItemKind::Product, "mask-1").await.unwrap().unwrap();
        assert_eq!(found.sku, "MASK-1");
        assert_eq!(found.available_quantity, 5);
        assert!(found.taxable);

        // same ref id under a different kind is a different item
        assert!(repo.lookup(ItemKind::RentalUnit, "mask-1").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inactive_items_are_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        repo.insert(&item(ItemKind::TripSlot, "trip-1", "TRIP-1", 8)).await.unwrap();
        assert!(repo.set_active(ItemKind::TripSlot, "trip-1", false).await.unwrap());

        assert!(repo.lookup(ItemKind::TripSlot, "trip-1").await.unwrap().is_none());
        assert!(repo.get(ItemKind::TripSlot, "trip-1").await.unwrap().is_some());
        assert!(repo.list_by_kind(ItemKind::TripSlot).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserve_is_guarded() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.catalog()
            .insert(&item(ItemKind::CourseSeat, "ow-1", "OW-1", 3))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(reserve(&mut conn, ItemKind::CourseSeat, "ow-1", 2).await.unwrap());
        assert!(!reserve(&mut conn, ItemKind::CourseSeat, "ow-1", 2).await.unwrap());
        release(&mut conn, ItemKind::CourseSeat, "ow-1", 2).await.unwrap();
        drop(conn);

        let seat = db.catalog().get(ItemKind::CourseSeat, "ow-1").await.unwrap().unwrap();
        assert_eq!(seat.available_quantity, 3);
    }
}
