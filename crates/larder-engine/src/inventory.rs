//! # Inventory Service
//!
//! Stock movements outside order creation, and expiry reporting.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  restock(product, qty, shelf life)                                      │
//! │     └─► one transaction: aggregate += qty, new batch or same-day merge │
//! │                                                                         │
//! │  adjust_out(product, qty)          (breakage, spoilage, write-offs)     │
//! │     └─► one transaction: aggregate -= qty, FIFO guarded decrements     │
//! │                                                                         │
//! │  batch_report(product, now)        status derived at read time         │
//! │  expiring_soon(now)                each batch against its own product  │
//! │                                    threshold                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;

use larder_core::validation::validate_restock;
use larder_core::{Batch, BatchAllocation, BatchStatus, ValidationError, MAX_SHELF_LIFE_DAYS};
use larder_db::{Database, DbError, NewBatch, RestockOutcome};

use crate::config::EngineConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid stock movement: {0}")]
    Validation(#[from] ValidationError),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    #[error("Database error: {0}")]
    Database(DbError),
}

impl From<DbError> for InventoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } if entity == "Product" => {
                InventoryError::ProductNotFound(id)
            }
            DbError::InsufficientStock {
                product_id,
                requested,
                available,
            } => InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => InventoryError::Database(other),
        }
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

// =============================================================================
// Report Rows
// =============================================================================

/// One batch with its freshness as of the report time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct BatchReportRow {
    pub batch: Batch,
    pub status: BatchStatus,
    pub days_until_expiry: i64,
}

/// A batch that needs attention, with its product named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ExpiringBatch {
    pub batch: Batch,
    pub sku: String,
    pub name: String,
    pub status: BatchStatus,
    pub days_until_expiry: i64,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Database,
    merge_same_day: bool,
}

impl InventoryService {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        InventoryService {
            db,
            merge_same_day: config.inventory.merge_same_day_restock,
        }
    }

    /// Receives `quantity` base units of a product.
    ///
    /// Same-day restocks of the same shelf life fold into one batch when the
    /// store enables it.
    pub async fn restock(
        &self,
        product_id: &str,
        quantity: i64,
        shelf_life_days: i64,
        received_at: DateTime<Utc>,
    ) -> InventoryResult<RestockOutcome> {
        validate_restock(quantity, shelf_life_days)?;

        let outcome = self
            .db
            .batches()
            .create(
                &NewBatch {
                    product_id: product_id.to_string(),
                    quantity,
                    shelf_life_days,
                    received_at,
                },
                self.merge_same_day,
            )
            .await?;

        Ok(outcome)
    }

    /// Takes `quantity` base units out of stock, oldest batches first.
    ///
    /// Nothing changes when the product cannot cover it.
    pub async fn adjust_out(
        &self,
        product_id: &str,
        quantity: i64,
        reason: &str,
    ) -> InventoryResult<Vec<BatchAllocation>> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        let plan = self.db.batches().allocate_fifo(product_id, quantity).await?;

        info!(
            product_id = %product_id,
            quantity = quantity,
            batches = plan.len(),
            reason = %reason,
            "Stock written off"
        );
        Ok(plan)
    }

    /// Every batch of a product with its status as of `now`.
    pub async fn batch_report(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<BatchReportRow>> {
        let product = self
            .db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.to_string()))?;

        let rows = self
            .db
            .batches()
            .list_for_product(product_id)
            .await?
            .into_iter()
            .map(|batch| BatchReportRow {
                status: batch.status(now, product.expiry_notification_days),
                days_until_expiry: batch.days_until_expiry(now),
                batch,
            })
            .collect();

        Ok(rows)
    }

    /// Batches with stock left that are nearing expiry or already expired.
    ///
    /// Soonest expiry first.
    pub async fn expiring_soon(&self, now: DateTime<Utc>) -> InventoryResult<Vec<ExpiringBatch>> {
        // Nearing expiry means fewer than threshold + 1 whole days remain.
        let widest = self.db.products().max_notification_days().await?;
        // Thresholds beyond the longest shelf life cannot widen the scan.
        let widest = widest.clamp(0, MAX_SHELF_LIFE_DAYS);
        let horizon = now
            .checked_add_signed(Duration::days(widest + 1))
            .unwrap_or(now);

        let candidates = self.db.batches().list_expiring_before(horizon).await?;
        let scanned = candidates.len();

        let expiring: Vec<ExpiringBatch> = candidates
            .into_iter()
            .filter_map(|row| {
                let status = row.batch.status(now, row.expiry_notification_days);
                if status == BatchStatus::Fresh {
                    return None;
                }
                Some(ExpiringBatch {
                    days_until_expiry: row.batch.days_until_expiry(now),
                    status,
                    sku: row.sku,
                    name: row.name,
                    batch: row.batch,
                })
            })
            .collect();

        debug!(scanned = scanned, expiring = expiring.len(), "Expiry scan");
        Ok(expiring)
    }
}
