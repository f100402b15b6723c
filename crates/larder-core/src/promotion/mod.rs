//! # Promotions
//!
//! Promotion definitions and the pure evaluator that turns a definition and a
//! priced cart into a discount.
//!
//! ## Promotion Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ProductDiscount   percent or flat off the lines matching a scope       │
//! │                    (all / weighed only / fixed-unit only / products)    │
//! │                                                                         │
//! │  Bundle            every listed product present ──► fixed bundle price  │
//! │                    or percent off the bundle's normal price             │
//! │                                                                         │
//! │  BuyXGetY          same product:   N bought + M free per set            │
//! │                    two products:   N of X earns M of Y free             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Evaluation Outcomes
//! ```text
//!   structural problem (inactive, out of window, bad definition)
//!        ──► Err(PromotionError)            aborts the order
//!
//!   cart does not qualify
//!        ──► Eligibility::NotEligible       discount 0, order proceeds
//!
//!   cart qualifies but earns nothing
//!        ──► Eligibility::EligibleButUnmet  discount 0, order proceeds
//!
//!   otherwise
//!        ──► Eligibility::Applied           discount > 0, split over lines
//! ```

pub mod attribution;
pub mod evaluator;

pub use evaluator::{check_catalog, evaluate, validate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, RateBps};
use crate::pricing::CartLine;
use crate::types::UnitType;

// =============================================================================
// Definition
// =============================================================================

/// A promotion as stored in the promotion catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Promotion {
    pub id: String,
    /// Code the cashier enters. Unique.
    pub code: String,
    pub name: String,
    pub kind: PromotionKind,
    /// Minimum countable quantity over the lines the promotion looks at.
    pub min_quantity: Option<i64>,
    /// Cap for percent discounts.
    pub max_discount: Option<Money>,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ends_at: Option<DateTime<Utc>>,
    pub status: PromotionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    Active,
    Inactive,
}

/// The three promotion kinds. Each variant carries exactly the fields it
/// needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionKind {
    ProductDiscount {
        scope: DiscountScope,
        value: DiscountValue,
    },
    Bundle {
        product_ids: Vec<String>,
        pricing: BundlePricing,
    },
    BuyXGetY(BuyXGetYRule),
}

impl PromotionKind {
    /// Discriminator stored next to the JSON rule.
    pub fn kind_str(&self) -> &'static str {
        match self {
            PromotionKind::ProductDiscount { .. } => "product_discount",
            PromotionKind::Bundle { .. } => "bundle",
            PromotionKind::BuyXGetY(_) => "buy_x_get_y",
        }
    }

    /// Every product id the definition names.
    pub fn referenced_product_ids(&self) -> Vec<&str> {
        match self {
            PromotionKind::ProductDiscount {
                scope: DiscountScope::Products(ids),
                ..
            } => ids.iter().map(String::as_str).collect(),
            PromotionKind::ProductDiscount { .. } => Vec::new(),
            PromotionKind::Bundle { product_ids, .. } => {
                product_ids.iter().map(String::as_str).collect()
            }
            PromotionKind::BuyXGetY(BuyXGetYRule::SameProduct { product_id, .. }) => {
                vec![product_id.as_str()]
            }
            PromotionKind::BuyXGetY(BuyXGetYRule::DifferentProducts {
                buy_product_id,
                get_product_id,
                ..
            }) => vec![buy_product_id.as_str(), get_product_id.as_str()],
        }
    }
}

/// Which lines a product discount applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountScope {
    All,
    WeighedOnly,
    FixedUnitOnly,
    Products(Vec<String>),
}

impl DiscountScope {
    pub fn matches(&self, line: &CartLine) -> bool {
        match self {
            DiscountScope::All => true,
            DiscountScope::WeighedOnly => line.unit_type == UnitType::Weighed,
            DiscountScope::FixedUnitOnly => line.unit_type == UnitType::FixedUnit,
            DiscountScope::Products(ids) => ids.iter().any(|id| *id == line.product_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountValue {
    Percent(RateBps),
    Flat(Money),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BundlePricing {
    /// The whole bundle sells for this price.
    FixedPrice(Money),
    /// Percent off the bundle's normal price.
    PercentOff(RateBps),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BuyXGetYRule {
    /// Each set is `buy + get` pieces of one product; `get` of them are free.
    SameProduct {
        product_id: String,
        buy: i64,
        get: i64,
    },
    /// Every `buy` pieces of one product earn `get` free pieces of another.
    DifferentProducts {
        buy_product_id: String,
        buy: i64,
        get_product_id: String,
        get: i64,
    },
}

// =============================================================================
// Evaluation Result
// =============================================================================

/// Share of the promotion discount carried by one cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineDiscount {
    pub line_index: usize,
    pub amount: Money,
}

/// What evaluating a promotion against a cart produced.
///
/// When `eligibility` is not `Applied`, `discount` is zero and
/// `line_discounts` is empty. Otherwise the line discounts sum to `discount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PromotionEvaluation {
    pub promotion_id: String,
    pub code: String,
    pub discount: Money,
    pub eligibility: Eligibility,
    pub line_discounts: Vec<LineDiscount>,
}

impl PromotionEvaluation {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self.eligibility, Eligibility::Applied)
    }

    /// Message for the cashier.
    pub fn message(&self) -> String {
        match &self.eligibility {
            Eligibility::Applied => {
                format!("Promotion '{}' applied: {} off", self.code, self.discount)
            }
            Eligibility::NotEligible(reason) => {
                format!("Promotion '{}' not applied: {}", self.code, reason)
            }
            Eligibility::EligibleButUnmet(reason) => {
                format!("Promotion '{}' is valid but {}", self.code, reason)
            }
        }
    }

    /// Discount attributed to the line at `index`.
    pub fn discount_for_line(&self, index: usize) -> Money {
        self.line_discounts
            .iter()
            .filter(|d| d.line_index == index)
            .map(|d| d.amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Eligibility {
    Applied,
    NotEligible(NotEligibleReason),
    EligibleButUnmet(UnmetReason),
}

/// Why a cart does not qualify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotEligibleReason {
    /// No cart line falls in the promotion's scope.
    NoMatchingLines,
    /// Some bundle products are absent from the cart.
    BundleIncomplete { missing_product_ids: Vec<String> },
    BelowMinQuantity { required: i64, actual: i64 },
    /// Not enough pieces for a single buy-X-get-Y set.
    NotEnoughForSet { required: i64, actual: i64 },
}

impl fmt::Display for NotEligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotEligibleReason::NoMatchingLines => {
                write!(f, "no item in the cart qualifies")
            }
            NotEligibleReason::BundleIncomplete {
                missing_product_ids,
            } => write!(
                f,
                "bundle is incomplete, missing {}",
                missing_product_ids.join(", ")
            ),
            NotEligibleReason::BelowMinQuantity { required, actual } => write!(
                f,
                "requires at least {} qualifying items, cart has {}",
                required, actual
            ),
            NotEligibleReason::NotEnoughForSet { required, actual } => write!(
                f,
                "requires {} qualifying items per set, cart has {}",
                required, actual
            ),
        }
    }
}

/// Why a qualifying cart still earns no discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnmetReason {
    /// Free items were earned but the free product is not in the cart.
    FreeProductNotInCart { product_id: String, earned: i64 },
    /// The computed discount is zero (e.g. bundle price not below normal).
    ZeroDiscount,
}

impl fmt::Display for UnmetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmetReason::FreeProductNotInCart { product_id, earned } => write!(
                f,
                "{} free item(s) of {} were earned and none are in the cart",
                earned, product_id
            ),
            UnmetReason::ZeroDiscount => write!(f, "gives no discount on this cart"),
        }
    }
}
