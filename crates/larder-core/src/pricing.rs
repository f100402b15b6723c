//! # Cart Pricing
//!
//! Prices request lines against catalogue products. The resulting
//! [`CartLine`]s are what the promotion evaluator reads.
//!
//! ```text
//! fixed-unit:  unit_price × units
//! weighed:     grams × price_per_kg / 1000   (truncated)
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{LineQuantity, Product, UnitType};

/// A priced line of a cart.
///
/// `index` is the line's position in the request; promotion attributions
/// refer to lines by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub index: usize,
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit_type: UnitType,
    /// Price per piece, or per kilogram for weighed lines.
    pub unit_price: Money,
    pub cost_price: Money,
    pub quantity: LineQuantity,
    pub subtotal: Money,
}

impl CartLine {
    /// Prices `quantity` of `product`.
    ///
    /// `price_override` replaces the catalogue sell price when present. A
    /// line total that does not fit in [`Money`] is `OutOfRange`.
    pub fn priced(
        index: usize,
        product: &Product,
        quantity: LineQuantity,
        price_override: Option<Money>,
    ) -> Result<Self, ValidationError> {
        let unit_price = price_override.unwrap_or(product.sell_price);
        let subtotal = price_line(unit_price, quantity).ok_or_else(|| {
            ValidationError::OutOfRange {
                field: "line total".to_string(),
                min: 0,
                max: i64::MAX,
            }
        })?;
        Ok(CartLine {
            index,
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            unit_type: product.unit_type,
            unit_price,
            cost_price: product.cost_price,
            quantity,
            subtotal,
        })
    }

    /// Piece count, if this is a fixed-unit line.
    #[inline]
    pub fn units(&self) -> Option<i64> {
        self.quantity.units()
    }

    /// Contribution to a promotion's minimum quantity: pieces, or one per
    /// weighed line.
    #[inline]
    pub fn countable_quantity(&self) -> i64 {
        match self.quantity {
            LineQuantity::Units(n) => n,
            LineQuantity::Grams(_) => 1,
        }
    }
}

/// Prices one line; `None` on overflow.
pub fn price_line(unit_price: Money, quantity: LineQuantity) -> Option<Money> {
    match quantity {
        LineQuantity::Units(n) => unit_price.checked_times(n),
        LineQuantity::Grams(g) => unit_price.checked_for_grams(g),
    }
}

/// Sum of line subtotals (saturating).
pub fn cart_subtotal(lines: &[CartLine]) -> Money {
    lines.iter().map(|l| l.subtotal).sum()
}

/// Sum of line subtotals; `None` on overflow.
pub fn checked_cart_subtotal(lines: &[CartLine]) -> Option<Money> {
    Money::checked_sum(lines.iter().map(|l| l.subtotal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(unit_type: UnitType, price: i64) -> Product {
        Product {
            id: "p".to_string(),
            sku: "SKU".to_string(),
            name: "Item".to_string(),
            category: "Cat".to_string(),
            cost_price: Money::new(price / 2),
            sell_price: Money::new(price),
            unit_type,
            current_stock: 0,
            expiry_notification_days: 2,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn price(unit: i64, quantity: LineQuantity) -> Option<Money> {
        price_line(Money::new(unit), quantity)
    }

    #[test]
    fn test_price_line() {
        assert_eq!(price(4_500, LineQuantity::Units(3)), Some(Money::new(13_500)));
        assert_eq!(price(32_500, LineQuantity::Grams(755)), Some(Money::new(24_537)));
        assert_eq!(price(20_000, LineQuantity::Grams(500)), Some(Money::new(10_000)));
        assert_eq!(price(i64::MAX / 2, LineQuantity::Units(3)), None);
    }

    #[test]
    fn test_cart_line_uses_override() {
        let p = product(UnitType::FixedUnit, 5_000);
        let two = LineQuantity::Units(2);
        let line = CartLine::priced(0, &p, two, Some(Money::new(4_000))).unwrap();
        assert_eq!(line.unit_price, Money::new(4_000));
        assert_eq!(line.subtotal, Money::new(8_000));

        let line = CartLine::priced(1, &p, two, None).unwrap();
        assert_eq!(line.subtotal, Money::new(10_000));
        assert_eq!(cart_subtotal(&[line]), Money::new(10_000));
    }

    #[test]
    fn test_overflowing_line_is_out_of_range() {
        let p = product(UnitType::FixedUnit, 5_000);
        let huge = Some(Money::new(i64::MAX / 2));
        let result = CartLine::priced(0, &p, LineQuantity::Units(3), huge);
        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));

        let big = CartLine::priced(0, &p, LineQuantity::Units(1), Some(Money::new(i64::MAX)))
            .unwrap();
        assert_eq!(checked_cart_subtotal(&[big.clone(), big]), None);
    }

    #[test]
    fn test_countable_quantity() {
        let per_kg = product(UnitType::Weighed, 30_000);
        let weighed = CartLine::priced(0, &per_kg, LineQuantity::Grams(1_250), None).unwrap();
        assert_eq!(weighed.countable_quantity(), 1);
        assert_eq!(weighed.units(), None);

        let piece = product(UnitType::FixedUnit, 1_000);
        let fixed = CartLine::priced(1, &piece, LineQuantity::Units(4), None).unwrap();
        assert_eq!(fixed.countable_quantity(), 4);
    }
}
