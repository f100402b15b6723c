//! # Loyalty Repository
//!
//! Customer point balances and their tier snapshot.
//!
//! Balances move after an order has committed. The update is a single
//! relative statement so two tills settling the same account never lose
//! each other's points:
//!
//! ```text
//! UPDATE loyalty_accounts
//!    SET point_balance = MAX(point_balance - redeemed + accrued, 0)
//!  RETURNING point_balance          ──► tier re-derived from the new balance
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use larder_core::{LoyaltyAccount, LoyaltyProgram};

const ACCOUNT_COLUMNS: &str = "id, customer_name, point_balance, tier, updated_at";

/// Repository for loyalty account operations.
#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    /// Creates a new LoyaltyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    /// Opens an account with `opening_balance` points.
    pub async fn create(
        &self,
        customer_name: &str,
        opening_balance: i64,
        program: &LoyaltyProgram,
    ) -> DbResult<LoyaltyAccount> {
        let now = Utc::now();
        let account = LoyaltyAccount {
            id: Uuid::new_v4().to_string(),
            customer_name: customer_name.trim().to_string(),
            point_balance: opening_balance.max(0),
            tier: program.tier_name_for(opening_balance).to_string(),
            updated_at: now,
        };

        debug!(account_id = %account.id, tier = %account.tier, "Creating loyalty account");

        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (
                id, customer_name, point_balance, tier, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.customer_name)
        .bind(account.point_balance)
        .bind(&account.tier)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(account)
    }

    /// Gets an account by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<LoyaltyAccount>> {
        let sql = format!("SELECT {} FROM loyalty_accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, LoyaltyAccount>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Current point balance.
    pub async fn get_balance(&self, id: &str) -> DbResult<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT point_balance FROM loyalty_accounts WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        balance.ok_or_else(|| DbError::not_found("LoyaltyAccount", id))
    }

    /// Applies an order's redemption and accrual, then rewrites the tier.
    ///
    /// The tier follows the balance both ways.
    pub async fn settle(
        &self,
        id: &str,
        redeemed: i64,
        accrued: i64,
        program: &LoyaltyProgram,
    ) -> DbResult<LoyaltyAccount> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE loyalty_accounts
            SET point_balance = MAX(point_balance - ? + ?, 0), updated_at = ?
            WHERE id = ?
            RETURNING point_balance
            "#,
        )
        .bind(redeemed)
        .bind(accrued)
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let balance = balance.ok_or_else(|| DbError::not_found("LoyaltyAccount", id))?;
        let tier = program.tier_name_for(balance).to_string();

        sqlx::query("UPDATE loyalty_accounts SET tier = ? WHERE id = ?")
            .bind(&tier)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let sql = format!("SELECT {} FROM loyalty_accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, LoyaltyAccount>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            account_id = %id,
            redeemed = redeemed,
            accrued = accrued,
            balance = account.point_balance,
            tier = %account.tier,
            "Loyalty balance settled"
        );

        Ok(account)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
