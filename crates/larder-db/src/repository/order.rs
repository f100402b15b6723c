//! # Order Repository
//!
//! Database operations for committed orders, their lines, payments and the
//! batch allocation trail.
//!
//! ## Order Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   One Order = One Transaction                           │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   ├── next_order_number()   ← write first: takes the write lock        │
//! │   ├── insert_order()                                                   │
//! │   ├── for each line                                                    │
//! │   │     ├── insert_line()                                              │
//! │   │     ├── batch::allocate_fifo()                                     │
//! │   │     └── insert_allocation()  × batches used                        │
//! │   ├── insert_payment()      × payments                                 │
//! │  COMMIT                     (or drop → rollback, zero rows written)    │
//! │                                                                         │
//! │  Afterwards the order only changes through update_status().            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use larder_core::{
    CoreError, LineQuantity, Money, Order, OrderLine, OrderLineAllocation, OrderStatus, Payment,
    UnitType,
};

const ORDER_COLUMNS: &str = "id, order_number, customer_account_id, promotion_code, subtotal, \
     promo_discount, point_discount, total, amount_paid, change, points_redeemed, points_earned, \
     status, cashier_id, notes, created_at";

// =============================================================================
// Row Mapping
// =============================================================================

/// `order_lines` row. The quantity is split over two nullable columns.
#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    id: String,
    order_id: String,
    product_id: Option<String>,
    sku: String,
    name: String,
    category: String,
    unit_type: UnitType,
    unit_price: Money,
    cost_price: Money,
    quantity_units: Option<i64>,
    weight_grams: Option<i64>,
    subtotal: Money,
    discount: Money,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = DbError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let quantity = match (row.quantity_units, row.weight_grams) {
            (Some(units), None) => LineQuantity::Units(units),
            (None, Some(grams)) => LineQuantity::Grams(grams),
            _ => {
                return Err(DbError::Internal(format!(
                    "order line {} has no single quantity",
                    row.id
                )))
            }
        };

        Ok(OrderLine {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            sku: row.sku,
            name: row.name,
            category: row.category,
            unit_type: row.unit_type,
            unit_price: row.unit_price,
            cost_price: row.cost_price,
            quantity,
            subtotal: row.subtotal,
            discount: row.discount,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Transactional Operations
// =============================================================================

/// Reserves the next order number for `prefix` on the UTC day of `now`.
///
/// Format: `<prefix>-YYYYMMDD-NNNN`. The counter upsert is a write, so calling
/// this first in an order transaction takes the database write lock before any
/// stock is read.
pub async fn next_order_number(
    conn: &mut SqliteConnection,
    prefix: &str,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let day = now.format("%Y%m%d").to_string();

    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO order_sequences (prefix, day, last_value)
        VALUES (?, ?, 1)
        ON CONFLICT (prefix, day) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(prefix)
    .bind(&day)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format!("{}-{}-{:04}", prefix, day, seq))
}

/// Inserts an order header.
pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(order_id = %order.id, order_number = %order.order_number, "Inserting order");

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, customer_account_id, promotion_code,
            subtotal, promo_discount, point_discount, total,
            amount_paid, change, points_redeemed, points_earned,
            status, cashier_id, notes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.customer_account_id)
    .bind(&order.promotion_code)
    .bind(order.subtotal)
    .bind(order.promo_discount)
    .bind(order.point_discount)
    .bind(order.total)
    .bind(order.amount_paid)
    .bind(order.change)
    .bind(order.points_redeemed)
    .bind(order.points_earned)
    .bind(order.status)
    .bind(&order.cashier_id)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts one order line at position `line_no`.
pub async fn insert_line(
    conn: &mut SqliteConnection,
    line: &OrderLine,
    line_no: i64,
) -> DbResult<()> {
    debug!(order_id = %line.order_id, line_no = line_no, sku = %line.sku, "Inserting order line");

    sqlx::query(
        r#"
        INSERT INTO order_lines (
            id, order_id, line_no, product_id, sku, name, category,
            unit_type, unit_price, cost_price, quantity_units, weight_grams,
            subtotal, discount, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&line.id)
    .bind(&line.order_id)
    .bind(line_no)
    .bind(&line.product_id)
    .bind(&line.sku)
    .bind(&line.name)
    .bind(&line.category)
    .bind(line.unit_type)
    .bind(line.unit_price)
    .bind(line.cost_price)
    .bind(line.quantity.units())
    .bind(line.quantity.grams())
    .bind(line.subtotal)
    .bind(line.discount)
    .bind(line.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Records that `allocation.quantity` of a line came from one batch.
pub async fn insert_allocation(
    conn: &mut SqliteConnection,
    allocation: &OrderLineAllocation,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO order_line_batches (order_line_id, batch_id, quantity) VALUES (?, ?, ?)",
    )
    .bind(&allocation.order_line_id)
    .bind(&allocation.batch_id)
    .bind(allocation.quantity)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts a payment.
pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(order_id = %payment.order_id, amount = payment.amount.amount(), "Inserting payment");

    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, method, amount, reference, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.order_id)
    .bind(payment.method)
    .bind(payment.amount)
    .bind(&payment.reference)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Helper to generate a new order, line or payment ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Pool-Level Repository
// =============================================================================

/// Repository for committed orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Gets an order by its human-facing number.
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = ?", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Lines of an order, in the order they were rung up.
    pub async fn get_lines(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT
                id, order_id, product_id, sku, name, category, unit_type,
                unit_price, cost_price, quantity_units, weight_grams,
                subtotal, discount, created_at
            FROM order_lines
            WHERE order_id = ?
            ORDER BY line_no
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderLine::try_from).collect()
    }

    /// Payments of an order.
    pub async fn get_payments(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, method, amount, reference, created_at
            FROM payments
            WHERE order_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Which batches supplied each line of an order.
    pub async fn get_allocations(&self, order_id: &str) -> DbResult<Vec<OrderLineAllocation>> {
        let allocations = sqlx::query_as::<_, OrderLineAllocation>(
            r#"
            SELECT a.order_line_id, a.batch_id, a.quantity
            FROM order_line_batches a
            JOIN order_lines l ON l.id = a.order_line_id
            WHERE l.order_id = ?
            ORDER BY l.line_no, a.rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    /// Counts all orders (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Moves an order to `status`, for the returns workflow.
    ///
    /// ## Returns
    /// * `Ok(Order)` - The updated order
    /// * `Err(DbError::NotFound)` - No such order
    /// * `Err(DbError::InvalidTransition)` - The lifecycle forbids the move
    pub async fn update_status(&self, id: &str, status: OrderStatus) -> DbResult<Order> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        if !current.status.can_transition_to(status) {
            return Err(CoreError::InvalidStatusTransition {
                order_id: id.to_string(),
                from: current.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        // Guard on the status we read so a concurrent change is not overwritten.
        let result = sqlx::query(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(current.status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::InvalidTransition(format!(
                "order {} changed status concurrently",
                id
            )));
        }

        info!(order_id = %id, from = %current.status, to = %status, "Order status updated");

        Ok(Order { status, ..current })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::batch::{self, NewBatch};
    use crate::repository::test_support::{insert_product, memory_db};
    use chrono::TimeZone;
    use larder_core::PaymentMethod;

    fn sample_order(order_number: &str, now: DateTime<Utc>) -> Order {
        Order {
            id: generate_order_id(),
            order_number: order_number.to_string(),
            customer_account_id: None,
            promotion_code: None,
            subtotal: Money::new(30_000),
            promo_discount: Money::new(5_000),
            point_discount: Money::zero(),
            total: Money::new(25_000),
            amount_paid: Money::new(50_000),
            change: Money::new(25_000),
            points_redeemed: 0,
            points_earned: 2,
            status: OrderStatus::Completed,
            cashier_id: Some("cashier-1".to_string()),
            notes: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_order_numbers_are_sequential_per_day() {
        let db = memory_db().await;
        let monday = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();

        let mut tx = db.begin().await.unwrap();
        let a = next_order_number(&mut *tx, "ORD", monday).await.unwrap();
        let b = next_order_number(&mut *tx, "ORD", monday).await.unwrap();
        let c = next_order_number(&mut *tx, "ORD", tuesday).await.unwrap();
        let d = next_order_number(&mut *tx, "WEB", monday).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(a, "ORD-20260302-0001");
        assert_eq!(b, "ORD-20260302-0002");
        assert_eq!(c, "ORD-20260303-0001");
        assert_eq!(d, "WEB-20260302-0001");
    }

    #[tokio::test]
    async fn test_order_round_trip_with_trail() {
        let db = memory_db().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap();
        let rice = insert_product(&db, "RICE", UnitType::Weighed, 20_000).await;

        db.batches()
            .create(
                &NewBatch {
                    product_id: rice.id.clone(),
                    quantity: 5_000,
                    shelf_life_days: 180,
                    received_at: now,
                },
                false,
            )
            .await
            .unwrap();

        let order = sample_order("ORD-20260302-0001", now);
        let line = OrderLine {
            id: generate_order_id(),
            order_id: order.id.clone(),
            product_id: Some(rice.id.clone()),
            sku: rice.sku.clone(),
            name: rice.name.clone(),
            category: rice.category.clone(),
            unit_type: UnitType::Weighed,
            unit_price: Money::new(20_000),
            cost_price: Money::new(10_000),
            quantity: LineQuantity::Grams(1_500),
            subtotal: Money::new(30_000),
            discount: Money::new(5_000),
            created_at: now,
        };
        let payment = Payment {
            id: generate_order_id(),
            order_id: order.id.clone(),
            method: PaymentMethod::EWallet,
            amount: Money::new(50_000),
            reference: Some("QR-991".to_string()),
            created_at: now,
        };

        let mut tx = db.begin().await.unwrap();
        insert_order(&mut *tx, &order).await.unwrap();
        insert_line(&mut *tx, &line, 1).await.unwrap();
        let plan = batch::allocate_fifo(&mut *tx, &rice.id, 1_500, now).await.unwrap();
        for step in &plan {
            insert_allocation(
                &mut *tx,
                &OrderLineAllocation {
                    order_line_id: line.id.clone(),
                    batch_id: step.batch_id.clone(),
                    quantity: step.quantity,
                },
            )
            .await
            .unwrap();
        }
        insert_payment(&mut *tx, &payment).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.orders();
        let stored = repo.get_by_number("ORD-20260302-0001").await.unwrap().unwrap();
        assert_eq!(stored.id, order.id);
        assert_eq!(stored.total, Money::new(25_000));
        assert_eq!(stored.created_at, now);

        let lines = repo.get_lines(&order.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, LineQuantity::Grams(1_500));

        let payments = repo.get_payments(&order.id).await.unwrap();
        assert_eq!(payments[0].method, PaymentMethod::EWallet);

        let trail = repo.get_allocations(&order.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].quantity, 1_500);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_totals_are_rejected_by_schema() {
        let db = memory_db().await;
        let mut order = sample_order("ORD-20260302-0009", Utc::now());
        order.total = Money::new(26_000);

        let mut tx = db.begin().await.unwrap();
        let err = insert_order(&mut *tx, &order).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let db = memory_db().await;
        let order = sample_order("ORD-20260302-0002", Utc::now());

        let mut tx = db.begin().await.unwrap();
        insert_order(&mut *tx, &order).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.orders();
        let updated = repo
            .update_status(&order.id, OrderStatus::PartiallyReturned)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::PartiallyReturned);

        let err = repo
            .update_status(&order.id, OrderStatus::Voided)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition(_)));

        repo.update_status(&order.id, OrderStatus::Returned).await.unwrap();
        let stored = repo.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Returned);

        let err = repo
            .update_status("missing", OrderStatus::Returned)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
