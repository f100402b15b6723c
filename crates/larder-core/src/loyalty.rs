//! # Loyalty Points
//!
//! Point redemption during order creation and accrual after commit.
//!
//! ## Redemption
//! ```text
//! usable = min(requested, balance, floor(subtotal / point_value))
//!
//!   usable == 0                      ──► no redemption, discount 0
//!   0 < usable < min_redemption      ──► REJECTED (order aborts)
//!   otherwise                        ──► discount = usable × point_value
//! ```
//!
//! ## Accrual and Tier
//! ```text
//! accrued     = floor(order_total / min_transaction_for_points)
//! new balance = balance − redeemed + accrued
//! tier        = highest tier whose min_points ≤ new balance
//! ```
//! Tier is recomputed on every balance change and can go down as well as up.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::LoyaltyError;
use crate::money::Money;

// =============================================================================
// Programme
// =============================================================================

/// A named tier and the balance needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tier {
    pub name: String,
    pub min_points: i64,
}

impl Tier {
    pub fn new(name: impl Into<String>, min_points: i64) -> Self {
        Tier {
            name: name.into(),
            min_points,
        }
    }
}

/// Loyalty programme parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoyaltyProgram {
    /// Money value of one point.
    pub point_value: Money,
    /// Smallest non-zero redemption accepted.
    pub min_redemption_points: i64,
    /// Order total that earns one point.
    pub min_transaction_for_points: Money,
    /// Ordered by `min_points`, ascending.
    pub tiers: Vec<Tier>,
}

/// Tier name given when no tier threshold is reached.
pub const UNRANKED_TIER: &str = "member";

impl LoyaltyProgram {
    /// Builds a programme, sorting tiers by threshold.
    pub fn new(
        point_value: Money,
        min_redemption_points: i64,
        min_transaction_for_points: Money,
        mut tiers: Vec<Tier>,
    ) -> Self {
        tiers.sort_by_key(|t| t.min_points);
        LoyaltyProgram {
            point_value,
            min_redemption_points,
            min_transaction_for_points,
            tiers,
        }
    }

    /// Highest tier reached by `balance`.
    pub fn tier_for(&self, balance: i64) -> Option<&Tier> {
        self.tiers.iter().rev().find(|t| balance >= t.min_points)
    }

    pub fn tier_name_for(&self, balance: i64) -> &str {
        self.tier_for(balance)
            .map(|t| t.name.as_str())
            .unwrap_or(UNRANKED_TIER)
    }

    pub fn redeem(
        &self,
        requested: i64,
        balance: i64,
        subtotal: Money,
    ) -> Result<PointRedemption, LoyaltyError> {
        redeem_points(
            requested,
            balance,
            subtotal,
            self.point_value,
            self.min_redemption_points,
        )
    }

    pub fn accrue(&self, order_total: Money) -> i64 {
        accrue_points(order_total, self.min_transaction_for_points)
    }

    /// Applies an order's redemption and accrual to `current_balance`.
    pub fn settle(&self, current_balance: i64, redeemed: i64, accrued: i64) -> Settlement {
        let new_balance = settle_balance(current_balance, redeemed, accrued);
        Settlement {
            new_balance,
            tier: self.tier_name_for(new_balance).to_string(),
        }
    }
}

impl Default for LoyaltyProgram {
    fn default() -> Self {
        LoyaltyProgram::new(
            Money::new(1_000),
            10,
            Money::new(10_000),
            vec![
                Tier::new("bronze", 0),
                Tier::new("silver", 500),
                Tier::new("gold", 2_000),
                Tier::new("platinum", 10_000),
            ],
        )
    }
}

// =============================================================================
// Redemption
// =============================================================================

/// Points taken off an order and what they are worth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PointRedemption {
    pub points: i64,
    pub discount: Money,
}

/// Works out how many of the requested points can be redeemed.
///
/// A clamp that lands strictly between zero and `min_redemption` rejects the
/// redemption instead of silently shrinking it.
pub fn redeem_points(
    requested: i64,
    balance: i64,
    subtotal: Money,
    point_value: Money,
    min_redemption: i64,
) -> Result<PointRedemption, LoyaltyError> {
    if !point_value.is_positive() {
        return Err(LoyaltyError::InvalidPointValue(point_value));
    }
    if requested <= 0 {
        return Ok(PointRedemption::default());
    }

    let affordable = subtotal.amount().max(0) / point_value.amount();
    let usable = requested.min(balance.max(0)).min(affordable);

    if usable > 0 && usable < min_redemption {
        return Err(LoyaltyError::BelowMinimumRedemption {
            requested,
            usable,
            minimum: min_redemption,
        });
    }

    Ok(PointRedemption {
        points: usable,
        discount: point_value.times(usable),
    })
}

// =============================================================================
// Accrual
// =============================================================================

/// Points earned by an order total. Totals below the threshold earn nothing.
pub fn accrue_points(order_total: Money, min_transaction_for_points: Money) -> i64 {
    if !min_transaction_for_points.is_positive() || !order_total.is_positive() {
        return 0;
    }
    order_total.amount() / min_transaction_for_points.amount()
}

/// New balance after an order, never below zero.
pub fn settle_balance(current_balance: i64, redeemed: i64, accrued: i64) -> i64 {
    (current_balance - redeemed + accrued).max(0)
}

/// Result of applying an order to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    pub new_balance: i64,
    pub tier: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redemption_clamps_to_balance_and_subtotal() {
        // balance 50, requested 80, subtotal 300, value 10 -> min(50, 30) = 30
        let r = redeem_points(80, 50, Money::new(300), Money::new(10), 1).unwrap();
        assert_eq!(r.points, 30);
        assert_eq!(r.discount, Money::new(300));
    }

    #[test]
    fn test_redemption_below_minimum_is_rejected() {
        let err = redeem_points(80, 5, Money::new(10_000), Money::new(10), 10).unwrap_err();
        assert_eq!(
            err,
            LoyaltyError::BelowMinimumRedemption {
                requested: 80,
                usable: 5,
                minimum: 10
            }
        );
    }

    #[test]
    fn test_zero_clamp_is_not_a_rejection() {
        let r = redeem_points(80, 0, Money::new(10_000), Money::new(10), 10).unwrap();
        assert_eq!(r, PointRedemption::default());

        let r = redeem_points(0, 500, Money::new(10_000), Money::new(10), 10).unwrap();
        assert_eq!(r.points, 0);
    }

    #[test]
    fn test_invalid_point_value() {
        assert!(matches!(
            redeem_points(10, 10, Money::new(100), Money::zero(), 1),
            Err(LoyaltyError::InvalidPointValue(_))
        ));
    }

    #[test]
    fn test_accrual_floors_and_ignores_small_totals() {
        let threshold = Money::new(10_000);
        assert_eq!(accrue_points(Money::new(9_999), threshold), 0);
        assert_eq!(accrue_points(Money::new(10_000), threshold), 1);
        assert_eq!(accrue_points(Money::new(45_500), threshold), 4);
        assert_eq!(accrue_points(Money::new(45_500), Money::zero()), 0);
    }

    #[test]
    fn test_tier_moves_both_ways() {
        let program = LoyaltyProgram::new(
            Money::new(10),
            1,
            Money::new(100),
            vec![Tier::new("gold", 1_000), Tier::new("silver", 100)],
        );

        assert_eq!(program.tier_name_for(50), UNRANKED_TIER);
        assert_eq!(program.tier_name_for(100), "silver");
        assert_eq!(program.tier_name_for(1_500), "gold");

        // Redeeming down from gold drops the tier.
        let settled = program.settle(1_050, 200, 3);
        assert_eq!(settled.new_balance, 853);
        assert_eq!(settled.tier, "silver");

        let settled = program.settle(90, 0, 20);
        assert_eq!(settled.tier, "silver");
    }

    #[test]
    fn test_settle_never_negative() {
        assert_eq!(settle_balance(10, 30, 0), 0);
    }
}
