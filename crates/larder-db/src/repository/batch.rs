//! # Batch Repository
//!
//! The persistent half of the batch ledger: restocks, FIFO allocation and
//! expiry reporting.
//!
//! ## FIFO Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  allocate_fifo(conn, product_id, needed = 7)                           │
//! │                                                                         │
//! │  0. products.current_stock -= 7          (write lock taken up front)   │
//! │                                                                         │
//! │  1. list_available        ORDER BY received_at, rowid                  │
//! │       B1 (Mar 01) remaining 4                                          │
//! │       B2 (Mar 03) remaining 5                                          │
//! │       B3 (Mar 03) remaining 2                                          │
//! │                                                                         │
//! │  2. ledger::plan_fifo     [(B1, 4), (B2, 3)]   (pure, all-or-nothing)  │
//! │                                                                         │
//! │  3. guarded decrements                                                 │
//! │       UPDATE batches SET quantity_remaining = quantity_remaining - 4   │
//! │        WHERE id = 'B1' AND quantity_remaining >= 4                     │
//! │       rows_affected == 0  ──►  InsufficientStock (caller rolls back)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connection-level functions never commit. Callers run them inside a
//! transaction and commit once everything for the order or adjustment is in.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::adjust_stock;
use larder_core::ledger::{self, BatchAllocation};
use larder_core::validation::validate_restock;
use larder_core::{Batch, ValidationError, MAX_SHELF_LIFE_DAYS};

const BATCH_COLUMNS: &str = "id, product_id, quantity_received, quantity_remaining, \
     received_at, shelf_life_days, expires_at, created_at";

/// A restock to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub product_id: String,
    /// Base units received (pieces or grams).
    pub quantity: i64,
    pub shelf_life_days: i64,
    pub received_at: DateTime<Utc>,
}

/// What a restock did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockOutcome {
    /// The batch now holding the restocked quantity.
    pub batch: Batch,
    /// True when the quantity was folded into an existing same-day batch.
    pub merged: bool,
}

/// A batch with stock left, joined with its product's expiry threshold.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BatchWithThreshold {
    #[sqlx(flatten)]
    pub batch: Batch,
    pub sku: String,
    pub name: String,
    pub expiry_notification_days: i64,
}

// =============================================================================
// Transactional Operations
// =============================================================================

/// Records a restock and raises the product's aggregate stock.
///
/// With `merge_same_day`, a restock of the same product and shelf life on the
/// same UTC day as an existing batch is added to the most recent such batch.
/// The merged batch keeps its `received_at` and `expires_at`, so FIFO order is
/// untouched.
pub async fn create_batch(
    conn: &mut SqliteConnection,
    new: &NewBatch,
    merge_same_day: bool,
) -> DbResult<RestockOutcome> {
    validate_restock(new.quantity, new.shelf_life_days)?;
    let expires_at = ledger::expires_at(new.received_at, new.shelf_life_days).ok_or_else(|| {
        ValidationError::OutOfRange {
            field: "shelf life".to_string(),
            min: 0,
            max: MAX_SHELF_LIFE_DAYS,
        }
    })?;
    let now = Utc::now();

    // Write first: takes the lock and reports an unknown product as NotFound.
    adjust_stock(conn, &new.product_id, new.quantity, now).await?;

    if merge_same_day {
        if let Some(existing) = find_same_day_batch(conn, new).await? {
            debug!(
                batch_id = %existing.id,
                product_id = %new.product_id,
                quantity = new.quantity,
                "Merging restock into same-day batch"
            );

            sqlx::query(
                r#"
                UPDATE batches
                SET quantity_received = quantity_received + ?,
                    quantity_remaining = quantity_remaining + ?
                WHERE id = ?
                "#,
            )
            .bind(new.quantity)
            .bind(new.quantity)
            .bind(&existing.id)
            .execute(&mut *conn)
            .await?;

            let batch = Batch {
                quantity_received: existing.quantity_received + new.quantity,
                quantity_remaining: existing.quantity_remaining + new.quantity,
                ..existing
            };
            return Ok(RestockOutcome {
                batch,
                merged: true,
            });
        }
    }

    let batch = Batch {
        id: generate_batch_id(),
        product_id: new.product_id.clone(),
        quantity_received: new.quantity,
        quantity_remaining: new.quantity,
        received_at: new.received_at,
        shelf_life_days: new.shelf_life_days,
        expires_at,
        created_at: now,
    };

    debug!(
        batch_id = %batch.id,
        product_id = %batch.product_id,
        quantity = batch.quantity_received,
        "Inserting batch"
    );

    sqlx::query(
        r#"
        INSERT INTO batches (
            id, product_id, quantity_received, quantity_remaining,
            received_at, shelf_life_days, expires_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&batch.id)
    .bind(&batch.product_id)
    .bind(batch.quantity_received)
    .bind(batch.quantity_remaining)
    .bind(batch.received_at)
    .bind(batch.shelf_life_days)
    .bind(batch.expires_at)
    .bind(batch.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(RestockOutcome {
        batch,
        merged: false,
    })
}

async fn find_same_day_batch(
    conn: &mut SqliteConnection,
    new: &NewBatch,
) -> DbResult<Option<Batch>> {
    let (day_start, day_end) = ledger::day_bounds(new.received_at);

    let sql = format!(
        r#"
        SELECT {}
        FROM batches
        WHERE product_id = ?
          AND shelf_life_days = ?
          AND received_at >= ?
          AND received_at < ?
        ORDER BY received_at DESC, rowid DESC
        LIMIT 1
        "#,
        BATCH_COLUMNS
    );

    let batch = sqlx::query_as::<_, Batch>(&sql)
        .bind(&new.product_id)
        .bind(new.shelf_life_days)
        .bind(day_start)
        .bind(day_end)
        .fetch_optional(&mut *conn)
        .await?;

    // The text range only narrows the scan; the calendar day decides.
    Ok(batch.filter(|b| ledger::is_same_restock_day(b.received_at, new.received_at)))
}

/// Batches of `product_id` with stock left, in FIFO order.
///
/// Ties on `received_at` fall back to creation order.
pub async fn list_available(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<Batch>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM batches
        WHERE product_id = ? AND quantity_remaining > 0
        ORDER BY received_at, rowid
        "#,
        BATCH_COLUMNS
    );

    let batches = sqlx::query_as::<_, Batch>(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(batches)
}

/// Sum of remaining stock over a product's batches.
pub async fn remaining_total(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity_remaining), 0) FROM batches WHERE product_id = ?",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

/// Takes `needed` base units of `product_id` from its oldest batches.
///
/// Also lowers the product's aggregate stock by `needed`. On
/// `DbError::InsufficientStock` some decrements may already have run, so the
/// caller must drop its transaction rather than commit.
pub async fn allocate_fifo(
    conn: &mut SqliteConnection,
    product_id: &str,
    needed: i64,
    now: DateTime<Utc>,
) -> DbResult<Vec<BatchAllocation>> {
    // Write first so a standalone transaction holds the lock before reading.
    adjust_stock(conn, product_id, -needed, now).await?;

    let batches = list_available(conn, product_id).await?;
    let plan = ledger::plan_fifo(product_id, &batches, needed)?;

    for step in &plan {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET quantity_remaining = quantity_remaining - ?
            WHERE id = ? AND quantity_remaining >= ?
            "#,
        )
        .bind(step.quantity)
        .bind(&step.batch_id)
        .bind(step.quantity)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let available = remaining_total(conn, product_id).await?;
            warn!(
                product_id = %product_id,
                batch_id = %step.batch_id,
                requested = needed,
                available = available,
                "Batch drained underneath allocation"
            );
            return Err(DbError::InsufficientStock {
                product_id: product_id.to_string(),
                requested: needed,
                available,
            });
        }
    }

    debug!(
        product_id = %product_id,
        needed = needed,
        batches = plan.len(),
        "FIFO allocation applied"
    );

    Ok(plan)
}

/// Helper to generate a new batch ID.
pub fn generate_batch_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Pool-Level Repository
// =============================================================================

/// Repository for batch database operations.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Records a restock in its own transaction.
    pub async fn create(&self, new: &NewBatch, merge_same_day: bool) -> DbResult<RestockOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = create_batch(&mut *tx, new, merge_same_day).await?;
        tx.commit().await?;

        info!(
            batch_id = %outcome.batch.id,
            product_id = %new.product_id,
            quantity = new.quantity,
            merged = outcome.merged,
            "Restock recorded"
        );
        Ok(outcome)
    }

    /// Gets a batch by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Batch>> {
        let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
        let batch = sqlx::query_as::<_, Batch>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(batch)
    }

    /// Every batch of a product, drained ones included, in FIFO order.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Batch>> {
        let sql = format!(
            "SELECT {} FROM batches WHERE product_id = ? ORDER BY received_at, rowid",
            BATCH_COLUMNS
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(batches)
    }

    /// Batches with stock left, in FIFO order.
    pub async fn list_available(&self, product_id: &str) -> DbResult<Vec<Batch>> {
        let mut conn = self.pool.acquire().await?;
        list_available(&mut conn, product_id).await
    }

    /// Sum of remaining stock over a product's batches.
    pub async fn remaining_total(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        remaining_total(&mut conn, product_id).await
    }

    /// Allocates FIFO in its own transaction (manual write-offs).
    ///
    /// Nothing is changed when stock is short.
    pub async fn allocate_fifo(
        &self,
        product_id: &str,
        needed: i64,
    ) -> DbResult<Vec<BatchAllocation>> {
        let mut tx = self.pool.begin().await?;
        let plan = allocate_fifo(&mut *tx, product_id, needed, Utc::now()).await?;
        tx.commit().await?;
        Ok(plan)
    }

    /// Batches with stock left whose expiry falls before `horizon`, joined
    /// with the owning product's threshold.
    ///
    /// The caller narrows this down per product threshold.
    pub async fn list_expiring_before(
        &self,
        horizon: DateTime<Utc>,
    ) -> DbResult<Vec<BatchWithThreshold>> {
        let rows = sqlx::query_as::<_, BatchWithThreshold>(
            r#"
            SELECT
                b.id, b.product_id, b.quantity_received, b.quantity_remaining,
                b.received_at, b.shelf_life_days, b.expires_at, b.created_at,
                p.sku, p.name, p.expiry_notification_days
            FROM batches b
            JOIN products p ON p.id = b.product_id
            WHERE b.quantity_remaining > 0 AND b.expires_at < ?
            ORDER BY b.expires_at, b.rowid
            "#,
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{insert_product, memory_db};
    use chrono::{Duration, TimeZone};
    use larder_core::UnitType;

    fn restock(product_id: &str, quantity: i64, received_at: DateTime<Utc>) -> NewBatch {
        NewBatch {
            product_id: product_id.to_string(),
            quantity,
            shelf_life_days: 7,
            received_at,
        }
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_batch_sets_expiry_and_stock() {
        let db = memory_db().await;
        let product = insert_product(&db, "MILK", UnitType::FixedUnit, 12_000).await;

        let outcome = db
            .batches()
            .create(&restock(&product.id, 10, day(1, 9)), true)
            .await
            .unwrap();

        assert!(!outcome.merged);
        assert_eq!(outcome.batch.expires_at, day(8, 9));
        assert_eq!(outcome.batch.quantity_remaining, 10);

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 10);
    }

    #[tokio::test]
    async fn test_unrepresentable_shelf_life_is_rejected() {
        let db = memory_db().await;
        let product = insert_product(&db, "HONEY", UnitType::FixedUnit, 40_000).await;

        let mut forever = restock(&product.id, 10, day(1, 9));
        forever.shelf_life_days = i64::MAX;
        let err = db.batches().create(&forever, true).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Validation(ValidationError::OutOfRange { .. })
        ));

        assert!(db.batches().list_for_product(&product.id).await.unwrap().is_empty());
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 0);
    }

    #[tokio::test]
    async fn test_same_day_restock_merges() {
        let db = memory_db().await;
        let product = insert_product(&db, "BREAD", UnitType::FixedUnit, 15_000).await;
        let batches = db.batches();

        let first = batches.create(&restock(&product.id, 5, day(2, 8)), true).await.unwrap();
        let second = batches.create(&restock(&product.id, 3, day(2, 17)), true).await.unwrap();

        assert!(second.merged);
        assert_eq!(second.batch.id, first.batch.id);
        assert_eq!(second.batch.received_at, day(2, 8));
        assert_eq!(second.batch.quantity_received, 8);

        // Different shelf life is a different lot.
        let mut other = restock(&product.id, 2, day(2, 18));
        other.shelf_life_days = 14;
        assert!(!batches.create(&other, true).await.unwrap().merged);

        // Next day is a different lot.
        assert!(!batches.create(&restock(&product.id, 2, day(3, 8)), true).await.unwrap().merged);

        // Merging can be switched off.
        assert!(!batches.create(&restock(&product.id, 1, day(3, 9)), false).await.unwrap().merged);

        assert_eq!(batches.list_for_product(&product.id).await.unwrap().len(), 4);
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 13);
    }

    #[tokio::test]
    async fn test_restock_unknown_product_is_not_found() {
        let db = memory_db().await;
        let err = db
            .batches()
            .create(&restock("missing", 1, day(1, 9)), true)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_fifo_consumes_oldest_first() {
        let db = memory_db().await;
        let product = insert_product(&db, "EGGS", UnitType::FixedUnit, 2_500).await;
        let batches = db.batches();

        let older = batches.create(&restock(&product.id, 4, day(1, 9)), false).await.unwrap().batch;
        let newer = batches.create(&restock(&product.id, 6, day(3, 9)), false).await.unwrap().batch;

        let plan = batches.allocate_fifo(&product.id, 3).await.unwrap();
        assert_eq!(plan, vec![BatchAllocation { batch_id: older.id.clone(), quantity: 3 }]);

        let plan = batches.allocate_fifo(&product.id, 4).await.unwrap();
        assert_eq!(
            plan,
            vec![
                BatchAllocation { batch_id: older.id.clone(), quantity: 1 },
                BatchAllocation { batch_id: newer.id.clone(), quantity: 3 },
            ]
        );

        let available = batches.list_available(&product.id).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, newer.id);
        assert_eq!(available[0].quantity_remaining, 3);

        // Drained batches are kept.
        let drained = batches.get_by_id(&older.id).await.unwrap().unwrap();
        assert_eq!(drained.quantity_remaining, 0);

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 3);
    }

    #[tokio::test]
    async fn test_fifo_ties_break_by_creation_order() {
        let db = memory_db().await;
        let product = insert_product(&db, "APPLES", UnitType::Weighed, 30_000).await;
        let batches = db.batches();

        let first = batches
            .create(&restock(&product.id, 500, day(5, 9)), false)
            .await
            .unwrap()
            .batch;
        batches.create(&restock(&product.id, 500, day(5, 9)), false).await.unwrap();

        let plan = batches.allocate_fifo(&product.id, 200).await.unwrap();
        assert_eq!(plan[0].batch_id, first.id);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let db = memory_db().await;
        let product = insert_product(&db, "CHEESE", UnitType::FixedUnit, 40_000).await;
        let batches = db.batches();

        batches.create(&restock(&product.id, 2, day(1, 9)), false).await.unwrap();
        batches.create(&restock(&product.id, 3, day(2, 9)), false).await.unwrap();

        let err = batches.allocate_fifo(&product.id, 6).await.unwrap_err();
        match err {
            DbError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(batches.remaining_total(&product.id).await.unwrap(), 5);
        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 5);
    }

    #[tokio::test]
    async fn test_allocation_after_drain_reports_shortfall() {
        let db = memory_db().await;
        let product = insert_product(&db, "JUICE", UnitType::FixedUnit, 9_000).await;
        db.batches().create(&restock(&product.id, 4, day(1, 9)), false).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        allocate_fifo(&mut *tx, &product.id, 4, Utc::now()).await.unwrap();
        let err = allocate_fifo(&mut *tx, &product.id, 1, Utc::now()).await.unwrap_err();
        assert_eq!(err.shortfall(), Some(1));
    }

    #[tokio::test]
    async fn test_list_expiring_before() {
        let db = memory_db().await;
        let product = insert_product(&db, "FISH", UnitType::Weighed, 80_000).await;
        let batches = db.batches();

        let now = day(10, 12);
        let mut soon = restock(&product.id, 1_000, now - Duration::days(5));
        soon.shelf_life_days = 7;
        let mut later = restock(&product.id, 1_000, now);
        later.shelf_life_days = 30;
        batches.create(&soon, false).await.unwrap();
        batches.create(&later, false).await.unwrap();

        let rows = batches.list_expiring_before(now + Duration::days(10)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sku, "FISH");
        assert_eq!(rows[0].expiry_notification_days, 3);
        assert_eq!(rows[0].batch.shelf_life_days, 7);
    }
}
