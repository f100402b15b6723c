//! # Promotion Evaluator
//!
//! `(promotion, cart, now) → PromotionEvaluation`. Pure and repeatable:
//! the same inputs always give the same evaluation.
//!
//! ## Pipeline
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   ┌────────────┐
//! │   validate   │──►│ select lines │──►│ compute discount │──►│ attribute  │
//! │ status/window│   │ + min qty    │   │ per kind         │   │ to lines   │
//! │ definition   │   │              │   │                  │   │            │
//! └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘   └────────────┘
//!        │                  │                    │
//!        ▼                  ▼                    ▼
//!  Err(PromotionError)  NotEligible       EligibleButUnmet
//! ```

use chrono::{DateTime, Utc};

use crate::error::PromotionError;
use crate::money::{Money, RateBps};
use crate::pricing::{cart_subtotal, CartLine};
use crate::types::UnitType;

use super::attribution::distribute;
use super::{
    BundlePricing, BuyXGetYRule, DiscountScope, DiscountValue, Eligibility, LineDiscount,
    NotEligibleReason, Promotion, PromotionKind, PromotionStatus, PromotionEvaluation,
    UnmetReason,
};

// =============================================================================
// Validation
// =============================================================================

/// Checks that the promotion can apply at all at `now`.
///
/// Status first, then the validity window, then the definition itself.
pub fn validate(promotion: &Promotion, now: DateTime<Utc>) -> Result<(), PromotionError> {
    let code = promotion.code.clone();

    if promotion.status != PromotionStatus::Active {
        return Err(PromotionError::Inactive { code });
    }
    if now < promotion.starts_at {
        return Err(PromotionError::NotStarted {
            code,
            starts_at: promotion.starts_at,
        });
    }
    if let Some(ended_at) = promotion.ends_at {
        if now > ended_at {
            return Err(PromotionError::Expired { code, ended_at });
        }
    }

    let misconfigured = |reason: &str| PromotionError::Misconfigured {
        code: promotion.code.clone(),
        reason: reason.to_string(),
    };

    if promotion.min_quantity.is_some_and(|q| q < 0) {
        return Err(misconfigured("minimum quantity is negative"));
    }
    if promotion.max_discount.is_some_and(|m| m.is_negative()) {
        return Err(misconfigured("maximum discount is negative"));
    }

    match &promotion.kind {
        PromotionKind::ProductDiscount { scope, value } => {
            if let DiscountScope::Products(ids) = scope {
                if ids.is_empty() {
                    return Err(PromotionError::MissingProducts {
                        code,
                        product_ids: Vec::new(),
                    });
                }
            }
            match value {
                DiscountValue::Percent(rate) if !rate.is_valid() => {
                    return Err(misconfigured("percent is above 100%"));
                }
                DiscountValue::Flat(amount) if amount.is_negative() => {
                    return Err(misconfigured("flat discount is negative"));
                }
                _ => {}
            }
        }
        PromotionKind::Bundle {
            product_ids,
            pricing,
        } => {
            if product_ids.is_empty() {
                return Err(PromotionError::MissingProducts {
                    code,
                    product_ids: Vec::new(),
                });
            }
            match pricing {
                BundlePricing::FixedPrice(price) if price.is_negative() => {
                    return Err(misconfigured("bundle price is negative"));
                }
                BundlePricing::PercentOff(rate) if !rate.is_valid() => {
                    return Err(misconfigured("percent is above 100%"));
                }
                _ => {}
            }
        }
        PromotionKind::BuyXGetY(rule) => {
            let (buy, get) = match rule {
                BuyXGetYRule::SameProduct { buy, get, .. } => (*buy, *get),
                BuyXGetYRule::DifferentProducts {
                    buy_product_id,
                    buy,
                    get_product_id,
                    get,
                } => {
                    if buy_product_id == get_product_id {
                        return Err(misconfigured(
                            "buy and get products are the same; use the same-product mode",
                        ));
                    }
                    (*buy, *get)
                }
            };
            if buy <= 0 {
                return Err(misconfigured("buy quantity must be at least 1"));
            }
            if get <= 0 {
                return Err(misconfigured("free quantity must be at least 1"));
            }
        }
    }

    Ok(())
}

/// Checks that every product the definition names still exists.
///
/// `exists` answers for one product id against the catalogue.
pub fn check_catalog<F>(promotion: &Promotion, exists: F) -> Result<(), PromotionError>
where
    F: Fn(&str) -> bool,
{
    let mut missing: Vec<String> = Vec::new();
    for id in promotion.kind.referenced_product_ids() {
        if !exists(id) && !missing.iter().any(|m| m == id) {
            missing.push(id.to_string());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PromotionError::MissingProducts {
            code: promotion.code.clone(),
            product_ids: missing,
        })
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluates `promotion` against a priced cart.
pub fn evaluate(
    promotion: &Promotion,
    cart: &[CartLine],
    now: DateTime<Utc>,
) -> Result<PromotionEvaluation, PromotionError> {
    validate(promotion, now)?;

    let outcome = match &promotion.kind {
        PromotionKind::ProductDiscount { scope, value } => {
            product_discount(promotion, scope, *value, cart)
        }
        PromotionKind::Bundle {
            product_ids,
            pricing,
        } => bundle(promotion, product_ids, *pricing, cart),
        PromotionKind::BuyXGetY(rule) => buy_x_get_y(promotion, rule, cart),
    };

    Ok(outcome.finish(promotion, cart_subtotal(cart)))
}

/// Intermediate result of one kind's calculation.
enum Outcome {
    Applied {
        discount: Money,
        lines: Vec<LineDiscount>,
    },
    NotEligible(NotEligibleReason),
    Unmet(UnmetReason),
}

impl Outcome {
    fn finish(self, promotion: &Promotion, cart_subtotal: Money) -> PromotionEvaluation {
        let (discount, eligibility, line_discounts) = match self {
            Outcome::Applied { discount, lines } if discount.is_positive() => {
                if discount > cart_subtotal {
                    // Only reachable through a broken attribution; re-split.
                    let weights: Vec<(usize, Money)> =
                        lines.iter().map(|l| (l.line_index, l.amount)).collect();
                    (cart_subtotal, Eligibility::Applied, distribute(cart_subtotal, &weights))
                } else {
                    (discount, Eligibility::Applied, lines)
                }
            }
            Outcome::Applied { .. } => (
                Money::zero(),
                Eligibility::EligibleButUnmet(UnmetReason::ZeroDiscount),
                Vec::new(),
            ),
            Outcome::NotEligible(reason) => {
                (Money::zero(), Eligibility::NotEligible(reason), Vec::new())
            }
            Outcome::Unmet(reason) => {
                (Money::zero(), Eligibility::EligibleButUnmet(reason), Vec::new())
            }
        };

        PromotionEvaluation {
            promotion_id: promotion.id.clone(),
            code: promotion.code.clone(),
            discount,
            eligibility,
            line_discounts,
        }
    }
}

fn below_min_quantity(promotion: &Promotion, lines: &[&CartLine]) -> Option<NotEligibleReason> {
    let required = promotion.min_quantity?;
    let actual: i64 = lines.iter().map(|l| l.countable_quantity()).sum();
    (actual < required).then_some(NotEligibleReason::BelowMinQuantity { required, actual })
}

fn capped_percent(promotion: &Promotion, base: Money, rate: RateBps) -> Money {
    let discount = base.percentage(rate);
    match promotion.max_discount {
        Some(cap) => discount.min(cap),
        None => discount,
    }
}

// -----------------------------------------------------------------------------
// Product discount
// -----------------------------------------------------------------------------

fn product_discount(
    promotion: &Promotion,
    scope: &DiscountScope,
    value: DiscountValue,
    cart: &[CartLine],
) -> Outcome {
    let matching: Vec<&CartLine> = cart.iter().filter(|l| scope.matches(l)).collect();
    if matching.is_empty() {
        return Outcome::NotEligible(NotEligibleReason::NoMatchingLines);
    }
    if let Some(reason) = below_min_quantity(promotion, &matching) {
        return Outcome::NotEligible(reason);
    }

    let base: Money = matching.iter().map(|l| l.subtotal).sum();
    let discount = match value {
        DiscountValue::Percent(rate) => capped_percent(promotion, base, rate),
        DiscountValue::Flat(amount) => amount.min(base),
    };

    let weights: Vec<(usize, Money)> = matching.iter().map(|l| (l.index, l.subtotal)).collect();
    Outcome::Applied {
        discount,
        lines: distribute(discount, &weights),
    }
}

// -----------------------------------------------------------------------------
// Bundle
// -----------------------------------------------------------------------------

/// Normal price of one bundle component on `line`: one piece, or the whole
/// weighed line.
fn component_price(line: &CartLine) -> Money {
    match line.unit_type {
        UnitType::FixedUnit => line.unit_price,
        UnitType::Weighed => line.subtotal,
    }
}

fn bundle(
    promotion: &Promotion,
    product_ids: &[String],
    pricing: BundlePricing,
    cart: &[CartLine],
) -> Outcome {
    let mut components: Vec<(usize, Money)> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for product_id in product_ids {
        if seen.contains(&product_id.as_str()) {
            continue;
        }
        seen.push(product_id);

        let cheapest = cart
            .iter()
            .filter(|l| l.product_id == *product_id)
            .min_by_key(|l| component_price(l));
        match cheapest {
            Some(line) => components.push((line.index, component_price(line))),
            None => missing.push(product_id.clone()),
        }
    }

    if !missing.is_empty() {
        return Outcome::NotEligible(NotEligibleReason::BundleIncomplete {
            missing_product_ids: missing,
        });
    }

    let bundle_lines: Vec<&CartLine> = cart
        .iter()
        .filter(|l| seen.contains(&l.product_id.as_str()))
        .collect();
    if let Some(reason) = below_min_quantity(promotion, &bundle_lines) {
        return Outcome::NotEligible(reason);
    }

    let normal: Money = components.iter().map(|(_, price)| *price).sum();
    let discount = match pricing {
        BundlePricing::FixedPrice(price) => normal.saturating_sub(price),
        BundlePricing::PercentOff(rate) => capped_percent(promotion, normal, rate),
    };

    Outcome::Applied {
        discount,
        lines: distribute(discount, &components),
    }
}

// -----------------------------------------------------------------------------
// Buy X get Y
// -----------------------------------------------------------------------------

/// Gives `free` pieces to the cheapest lines first, each valued at `price`.
fn free_item_discounts(lines: &[&CartLine], free: i64, price: Money) -> Vec<LineDiscount> {
    let mut by_price: Vec<&&CartLine> = lines.iter().collect();
    by_price.sort_by_key(|l| l.unit_price);

    let mut outstanding = free;
    let mut result = Vec::new();
    for line in by_price {
        if outstanding == 0 {
            break;
        }
        let pieces = line.units().unwrap_or(0).min(outstanding);
        if pieces > 0 && price.is_positive() {
            result.push(LineDiscount {
                line_index: line.index,
                amount: price.times(pieces),
            });
        }
        outstanding -= pieces;
    }
    result
}

fn unit_lines<'a>(cart: &'a [CartLine], product_id: &str) -> Vec<&'a CartLine> {
    cart.iter()
        .filter(|l| l.product_id == product_id && l.units().is_some())
        .collect()
}

fn lowest_unit_price(lines: &[&CartLine]) -> Money {
    lines
        .iter()
        .map(|l| l.unit_price)
        .min()
        .unwrap_or_default()
}

fn buy_x_get_y(promotion: &Promotion, rule: &BuyXGetYRule, cart: &[CartLine]) -> Outcome {
    match rule {
        BuyXGetYRule::SameProduct {
            product_id,
            buy,
            get,
        } => {
            let lines = unit_lines(cart, product_id);
            if lines.is_empty() {
                return Outcome::NotEligible(NotEligibleReason::NoMatchingLines);
            }
            if let Some(reason) = below_min_quantity(promotion, &lines) {
                return Outcome::NotEligible(reason);
            }

            let quantity: i64 = lines.iter().filter_map(|l| l.units()).sum();
            let set_size = buy + get;
            let sets = quantity / set_size;
            if sets == 0 {
                return Outcome::NotEligible(NotEligibleReason::NotEnoughForSet {
                    required: set_size,
                    actual: quantity,
                });
            }

            let free = sets * get;
            let price = lowest_unit_price(&lines);
            Outcome::Applied {
                discount: price.times(free),
                lines: free_item_discounts(&lines, free, price),
            }
        }
        BuyXGetYRule::DifferentProducts {
            buy_product_id,
            buy,
            get_product_id,
            get,
        } => {
            let x_lines = unit_lines(cart, buy_product_id);
            if x_lines.is_empty() {
                return Outcome::NotEligible(NotEligibleReason::NoMatchingLines);
            }

            let y_lines = unit_lines(cart, get_product_id);
            let relevant: Vec<&CartLine> = x_lines.iter().chain(y_lines.iter()).copied().collect();
            if let Some(reason) = below_min_quantity(promotion, &relevant) {
                return Outcome::NotEligible(reason);
            }

            let x_quantity: i64 = x_lines.iter().filter_map(|l| l.units()).sum();
            let sets = x_quantity / buy;
            if sets == 0 {
                return Outcome::NotEligible(NotEligibleReason::NotEnoughForSet {
                    required: *buy,
                    actual: x_quantity,
                });
            }

            let earned = sets * get;
            let y_quantity: i64 = y_lines.iter().filter_map(|l| l.units()).sum();
            if y_quantity == 0 {
                return Outcome::Unmet(UnmetReason::FreeProductNotInCart {
                    product_id: get_product_id.clone(),
                    earned,
                });
            }

            let free = earned.min(y_quantity);
            let price = lowest_unit_price(&y_lines);
            Outcome::Applied {
                discount: price.times(free),
                lines: free_item_discounts(&y_lines, free, price),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
