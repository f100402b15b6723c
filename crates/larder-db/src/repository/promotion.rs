//! # Promotion Repository
//!
//! The promotion catalogue. Each row stores the promotion's rule as JSON
//! next to a plain `kind` column:
//!
//! ```text
//! code      kind          rule
//! ────────  ────────────  ───────────────────────────────────────────────
//! FRUIT10   product_...   {"type":"product_discount","scope":"weighed_only",
//!                          "value":{"percent":1000}}
//! B1G1YOG   buy_x_get_y   {"type":"buy_x_get_y","mode":"same_product",
//!                          "product_id":"...","buy":1,"get":1}
//! ```
//!
//! Codes are matched case-insensitively (`COLLATE NOCASE`).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use larder_core::promotion::PromotionStatus;
use larder_core::{Money, Promotion, PromotionKind};

const PROMOTION_COLUMNS: &str =
    "id, code, name, rule, min_quantity, max_discount, starts_at, ends_at, status";

/// `promotions` row with the rule still serialised.
#[derive(Debug, sqlx::FromRow)]
struct PromotionRow {
    id: String,
    code: String,
    name: String,
    rule: String,
    min_quantity: Option<i64>,
    max_discount: Option<Money>,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    status: PromotionStatus,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = DbError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        let kind: PromotionKind = serde_json::from_str(&row.rule)?;
        Ok(Promotion {
            id: row.id,
            code: row.code,
            name: row.name,
            kind,
            min_quantity: row.min_quantity,
            max_discount: row.max_discount,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            status: row.status,
        })
    }
}

/// Repository for promotion database operations.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    /// Creates a new PromotionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Inserts a promotion.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - Code already in use (any case)
    pub async fn insert(&self, promotion: &Promotion) -> DbResult<Promotion> {
        debug!(code = %promotion.code, kind = promotion.kind.kind_str(), "Inserting promotion");

        let rule = serde_json::to_string(&promotion.kind)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO promotions (
                id, code, name, kind, rule, min_quantity, max_discount,
                starts_at, ends_at, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.code)
        .bind(&promotion.name)
        .bind(promotion.kind.kind_str())
        .bind(&rule)
        .bind(promotion.min_quantity)
        .bind(promotion.max_discount)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(promotion.status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(promotion.clone()),
            Err(e) => match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => {
                    Err(DbError::duplicate(field, promotion.code.clone()))
                }
                other => Err(other),
            },
        }
    }

    /// Looks a promotion up by code, ignoring case.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Promotion>> {
        let sql = format!("SELECT {} FROM promotions WHERE code = ?", PROMOTION_COLUMNS);
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Promotion::try_from).transpose()
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Promotion>> {
        let sql = format!("SELECT {} FROM promotions WHERE id = ?", PROMOTION_COLUMNS);
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Promotion::try_from).transpose()
    }

    /// Promotions marked active whose window contains `now`.
    pub async fn list_active(&self, now: DateTime<Utc>) -> DbResult<Vec<Promotion>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM promotions
            WHERE status = 'active'
              AND starts_at <= ?
              AND (ends_at IS NULL OR ends_at > ?)
            ORDER BY code
            "#,
            PROMOTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(now)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Promotion::try_from).collect()
    }

    /// Switches a promotion on or off.
    pub async fn set_status(&self, id: &str, status: PromotionStatus) -> DbResult<()> {
        debug!(id = %id, status = ?status, "Updating promotion status");

        let result = sqlx::query("UPDATE promotions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", id));
        }

        Ok(())
    }
}

/// Helper to generate a new promotion ID.
pub fn generate_promotion_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::memory_db;
    use chrono::Duration;
    use larder_core::promotion::{BuyXGetYRule, DiscountScope, DiscountValue};
    use larder_core::RateBps;

    fn promotion(code: &str, kind: PromotionKind) -> Promotion {
        Promotion {
            id: generate_promotion_id(),
            code: code.to_string(),
            name: format!("{} promo", code),
            kind,
            min_quantity: None,
            max_discount: Some(Money::new(15_000)),
            starts_at: Utc::now() - Duration::days(1),
            ends_at: None,
            status: PromotionStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_rule_survives_storage() {
        let db = memory_db().await;
        let repo = db.promotions();

        let fruit = promotion(
            "FRUIT10",
            PromotionKind::ProductDiscount {
                scope: DiscountScope::WeighedOnly,
                value: DiscountValue::Percent(RateBps::from_percent(10)),
            },
        );
        let b1g1 = promotion(
            "B1G1",
            PromotionKind::BuyXGetY(BuyXGetYRule::SameProduct {
                product_id: "p-yog".to_string(),
                buy: 1,
                get: 1,
            }),
        );
        repo.insert(&fruit).await.unwrap();
        repo.insert(&b1g1).await.unwrap();

        let stored = repo.get_by_code("fruit10").await.unwrap().unwrap();
        assert_eq!(stored, fruit);

        let stored = repo.get_by_id(&b1g1.id).await.unwrap().unwrap();
        assert_eq!(stored.kind, b1g1.kind);

        assert!(repo.get_by_code("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_codes_are_unique_ignoring_case() {
        let db = memory_db().await;
        let repo = db.promotions();
        let kind = PromotionKind::ProductDiscount {
            scope: DiscountScope::All,
            value: DiscountValue::Flat(Money::new(1_000)),
        };

        repo.insert(&promotion("SAVE", kind.clone())).await.unwrap();
        let err = repo.insert(&promotion("save", kind)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_list_active_respects_status_and_window() {
        let db = memory_db().await;
        let repo = db.promotions();
        let kind = PromotionKind::ProductDiscount {
            scope: DiscountScope::All,
            value: DiscountValue::Flat(Money::new(1_000)),
        };
        let now = Utc::now();

        let live = promotion("LIVE", kind.clone());
        let off = promotion("OFF", kind.clone());
        let mut ended = promotion("ENDED", kind.clone());
        ended.ends_at = Some(now - Duration::hours(1));
        let mut future = promotion("FUTURE", kind);
        future.starts_at = now + Duration::days(2);

        for p in [&live, &off, &ended, &future] {
            repo.insert(p).await.unwrap();
        }
        repo.set_status(&off.id, PromotionStatus::Inactive).await.unwrap();

        let active = repo.list_active(now).await.unwrap();
        let codes: Vec<_> = active.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["LIVE"]);

        let err = repo.set_status("missing", PromotionStatus::Active).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
