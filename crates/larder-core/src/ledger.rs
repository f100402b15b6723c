//! # Batch Ledger Rules
//!
//! Pure rules over expiry-dated stock lots. The transactional side (reading
//! and decrementing rows) lives in `larder-db::repository::batch`; everything
//! here is deterministic and takes `now` as a parameter.
//!
//! ## FIFO Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Batches (oldest received first)        need = 7                        │
//! │                                                                         │
//! │  B1  received 03-01  remaining 4   ──► take 4   (need 3)               │
//! │  B2  received 03-01  remaining 2   ──► take 2   (need 1)   tie: rowid  │
//! │  B3  received 03-04  remaining 9   ──► take 1   (need 0)               │
//! │  B4  received 03-06  remaining 5       untouched                        │
//! │                                                                         │
//! │  Σ remaining < need  ──►  InsufficientStock, nothing planned            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Derivation
//! ```text
//! days = floor((expires_at - now) / 1 day)
//!
//!   days < 0                 ──► Expired
//!   days <= threshold        ──► NearingExpiry   (threshold is per product)
//!   otherwise                ──► Fresh
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::types::Batch;

const SECONDS_PER_DAY: i64 = 86_400;

// =============================================================================
// Batch Status
// =============================================================================

/// Freshness of a batch, derived at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Fresh,
    NearingExpiry,
    Expired,
}

/// Computes the expiry instant of a batch.
///
/// `None` when the result falls outside the representable date range.
pub fn expires_at(received_at: DateTime<Utc>, shelf_life_days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(shelf_life_days).and_then(|d| received_at.checked_add_signed(d))
}

/// Whole days from `now` until `expires_at`, rounded toward negative infinity.
///
/// A batch that expired one hour ago is at `-1`, not `0`.
pub fn days_until_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Derives the status of a batch expiring at `expires_at`.
///
/// `notification_days` is the owning product's threshold.
pub fn derive_status(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    notification_days: i64,
) -> BatchStatus {
    let days = days_until_expiry(expires_at, now);
    if days < 0 {
        BatchStatus::Expired
    } else if days <= notification_days {
        BatchStatus::NearingExpiry
    } else {
        BatchStatus::Fresh
    }
}

// =============================================================================
// Same-Day Restock
// =============================================================================

/// Whether a restock at `incoming` falls on the same calendar day (UTC) as a
/// batch received at `existing`.
pub fn is_same_restock_day(existing: DateTime<Utc>, incoming: DateTime<Utc>) -> bool {
    existing.date_naive() == incoming.date_naive()
}

/// UTC start and end (exclusive) of the day containing `at`.
pub fn day_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

// =============================================================================
// FIFO Planning
// =============================================================================

/// One step of a FIFO plan: take `quantity` base units from `batch_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchAllocation {
    pub batch_id: String,
    pub quantity: i64,
}

/// Plans a FIFO allocation of `needed` base units over `batches`.
///
/// `batches` must already be in FIFO order. Empty batches are skipped. If the
/// total remaining is short, nothing is planned and the shortfall is reported.
pub fn plan_fifo(
    product_id: &str,
    batches: &[Batch],
    needed: i64,
) -> Result<Vec<BatchAllocation>, CoreError> {
    let available: i64 = batches
        .iter()
        .filter(|b| b.quantity_remaining > 0)
        .map(|b| b.quantity_remaining)
        .sum();

    if available < needed {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            requested: needed,
            available,
        });
    }

    let mut plan = Vec::new();
    let mut outstanding = needed;
    for batch in batches.iter().filter(|b| b.quantity_remaining > 0) {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(batch.quantity_remaining);
        plan.push(BatchAllocation {
            batch_id: batch.id.clone(),
            quantity: take,
        });
        outstanding -= take;
    }

    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================
