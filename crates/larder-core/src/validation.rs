//! # Validation Module
//!
//! Input validation utilities for Larder POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request shape (THIS MODULE)                                  │
//! │  ├── Non-empty lines and payments                                      │
//! │  ├── Positive quantities, non-negative prices                          │
//! │  └── Quantity kind matches the product's unit type                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Order engine                                                 │
//! │  ├── Promotion and point preconditions                                 │
//! │  └── Stock and payment coverage                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (0 <= remaining <= received)                                │
//! │  ├── UNIQUE order numbers and promotion codes                          │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use larder_core::validation::{validate_sku, validate_line_quantity};
//! use larder_core::{LineQuantity, UnitType};
//!
//! assert!(validate_sku("YOGURT-150").is_ok());
//! assert!(validate_line_quantity("BANANA", UnitType::Weighed, &LineQuantity::Grams(755)).is_ok());
//! assert!(validate_line_quantity("BANANA", UnitType::Weighed, &LineQuantity::Units(1)).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{LineQuantity, Product, UnitType};
use crate::{
    MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_LINE_WEIGHT_GRAMS, MAX_MONEY, MAX_PAYMENTS,
    MAX_SHELF_LIFE_DAYS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name: non-empty, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Checks a catalogue entry before it is stored.
pub fn validate_product(product: &Product) -> ValidationResult<()> {
    validate_sku(&product.sku)?;
    validate_product_name(&product.name)?;
    validate_price(product.sell_price)?;
    validate_price(product.cost_price)?;

    if product.expiry_notification_days < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "expiry notification days".to_string(),
        });
    }

    if product.expiry_notification_days > MAX_SHELF_LIFE_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "expiry notification days".to_string(),
            min: 0,
            max: MAX_SHELF_LIFE_DAYS,
        });
    }

    Ok(())
}

/// Validates a promotion code entered at the till.
///
/// ## Returns
/// The trimmed, upper-cased code.
pub fn normalize_promotion_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "promotion code".to_string(),
        });
    }

    if code.len() > 32 {
        return Err(ValidationError::TooLong {
            field: "promotion code".to_string(),
            max: 32,
        });
    }

    Ok(code.to_uppercase())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity against the product's unit type.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Scale reads 755 g for BANANA (weighed)                                 │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_line_quantity("BANANA", Weighed, Grams(755)) ← THIS FUNCTION  │
/// │       │                                                                 │
/// │       ├── kind mismatch?  → "BANANA is sold by weight, ..."            │
/// │       ├── qty <= 0?       → "quantity must be positive"                │
/// │       ├── over the limit? → "quantity must be between ..."             │
/// │       │                                                                 │
/// │       └── OK → line is priced                                          │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_line_quantity(
    sku: &str,
    unit_type: UnitType,
    quantity: &LineQuantity,
) -> ValidationResult<()> {
    let (max, matches) = match (unit_type, quantity) {
        (UnitType::FixedUnit, LineQuantity::Units(_)) => (MAX_ITEM_QUANTITY, true),
        (UnitType::Weighed, LineQuantity::Grams(_)) => (MAX_LINE_WEIGHT_GRAMS, true),
        _ => (0, false),
    };

    if !matches {
        return Err(ValidationError::UnitMismatch {
            sku: sku.to_string(),
            expected: match unit_type {
                UnitType::Weighed => "by weight".to_string(),
                UnitType::FixedUnit => "by the piece".to_string(),
            },
            given: quantity.kind_label().to_string(),
        });
    }

    let qty = quantity.base_units();
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates a unit price: zero (free items) up to [`MAX_MONEY`].
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    if price.amount() > MAX_MONEY {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_MONEY,
        });
    }

    Ok(())
}

/// Validates a payment amount: positive, at most [`MAX_MONEY`].
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    if amount.amount() > MAX_MONEY {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 1,
            max: MAX_MONEY,
        });
    }

    Ok(())
}

/// Validates a requested point redemption. Zero means "none".
pub fn validate_points(points: i64) -> ValidationResult<()> {
    if points < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "points".to_string(),
        });
    }

    Ok(())
}

/// Validates a restock: positive quantity, shelf life of 0 to
/// [`MAX_SHELF_LIFE_DAYS`].
pub fn validate_restock(quantity: i64, shelf_life_days: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if shelf_life_days < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "shelf life".to_string(),
        });
    }

    if shelf_life_days > MAX_SHELF_LIFE_DAYS {
        return Err(ValidationError::OutOfRange {
            field: "shelf life".to_string(),
            min: 0,
            max: MAX_SHELF_LIFE_DAYS,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on an order: 1 to MAX_CART_ITEMS.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Empty {
            field: "lines".to_string(),
        });
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates the number of payments on an order: 1 to MAX_PAYMENTS.
pub fn validate_payment_count(payments: usize) -> ValidationResult<()> {
    if payments == 0 {
        return Err(ValidationError::Empty {
            field: "payments".to_string(),
        });
    }

    if payments > MAX_PAYMENTS {
        return Err(ValidationError::OutOfRange {
            field: "payments".to_string(),
            min: 1,
            max: MAX_PAYMENTS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
