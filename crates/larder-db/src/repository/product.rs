//! # Product Repository
//!
//! Read access to the product catalogue plus the aggregate stock column.
//!
//! ## Aggregate Stock
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  products.current_stock   ==   Σ batches.quantity_remaining         │
//! │                                                                     │
//! │  Every path that moves batch stock moves the aggregate in the       │
//! │  same transaction, always as a delta:                               │
//! │                                                                     │
//! │     UPDATE products SET current_stock = current_stock + ?delta      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use larder_core::validation::validate_product;
use larder_core::Product;

const PRODUCT_COLUMNS: &str = "id, sku, name, category, cost_price, sell_price, unit_type, \
     current_stock, expiry_notification_days, is_active, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE sku = ?", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Loads every product in `ids` that exists (active or not).
    ///
    /// Order of the result is unspecified; missing ids are simply absent.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM products WHERE id IN (", PRODUCT_COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let products = builder
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;

        debug!(requested = ids.len(), found = products.len(), "Loaded products");
        Ok(products)
    }

    /// Which of `ids` exist as active products.
    pub async fn existing_ids(&self, ids: &[&str]) -> DbResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM products WHERE is_active = 1 AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let found: Vec<String> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;

        Ok(found.into_iter().collect())
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// Stock always starts at zero whatever `current_stock` says; it only
    /// moves through batches.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::Validation)` - Bad SKU, name, price or threshold
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_product(product)?;
        debug!(sku = %product.sku, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, category,
                cost_price, sell_price, unit_type,
                current_stock, expiry_notification_days,
                is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.cost_price)
        .bind(product.sell_price)
        .bind(product.unit_type)
        .bind(0_i64)
        .bind(product.expiry_notification_days)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Product {
                current_stock: 0,
                ..product.clone()
            }),
            Err(e) => match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => {
                    Err(DbError::duplicate(field, product.sku.clone()))
                }
                other => Err(other),
            },
        }
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Order history and batches keep referencing the row.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Largest expiry notification threshold in the catalogue, in days.
    pub async fn max_notification_days(&self) -> DbResult<i64> {
        let days: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(expiry_notification_days), 0) FROM products",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(days)
    }
}

// =============================================================================
// Transactional Operations
// =============================================================================

/// Moves a product's aggregate stock by `delta` base units.
///
/// Runs on the caller's connection so it joins the caller's transaction.
pub async fn adjust_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    debug!(product_id = %product_id, delta = delta, "Adjusting aggregate stock");

    let result = sqlx::query(
        "UPDATE products SET current_stock = current_stock + ?, updated_at = ? WHERE id = ?",
    )
    .bind(delta)
    .bind(now)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product_id));
    }

    Ok(())
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
