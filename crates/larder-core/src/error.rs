//! # Error Types
//!
//! Domain-specific error types for larder-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  larder-core errors (this file)                                        │
//! │  ├── CoreError        - General domain errors (stock, lookups)         │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  ├── PromotionError   - Structural promotion failures                  │
//! │  └── LoyaltyError     - Point redemption rejected                      │
//! │                                                                         │
//! │  larder-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  larder-engine errors                                                  │
//! │  └── OrderError       - What the order caller sees                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, amounts, codes)
//! 3. Errors are enum variants, never String

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found in the catalogue.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Not enough remaining batch stock to cover a deduction.
    ///
    /// ## User Workflow
    /// ```text
    /// Order line: 6 × YOGURT-150
    ///      │
    ///      ▼
    /// Batches remaining: 3 + 2 = 5
    ///      │
    ///      ▼
    /// InsufficientStock { requested: 6, available: 5 }
    ///      │
    ///      ▼
    /// Cashier sees: "Insufficient stock for product ...: requested 6, available 5 (short 1)"
    /// ```
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available} (short {})",
        requested - available
    )]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The order cannot move to the requested status.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        order_id: String,
        from: String,
        to: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a request is malformed and are raised before any
/// pricing or persistence happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Collection must contain at least one element.
    #[error("{field} must not be empty")]
    Empty { field: String },

    /// Quantity kind does not match the product's unit type.
    #[error("{sku} is sold {expected}, but the line gives a quantity {given}")]
    UnitMismatch {
        sku: String,
        expected: String,
        given: String,
    },
}

// =============================================================================
// Promotion Error
// =============================================================================

/// Structural promotion failures.
///
/// These abort order creation: the cashier entered a code that cannot apply
/// at all. A promotion that is valid but not triggered by the cart is NOT an
/// error (see `promotion::Eligibility`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("Promotion code '{0}' does not exist")]
    NotFound(String),

    #[error("Promotion '{code}' is inactive")]
    Inactive { code: String },

    #[error("Promotion '{code}' starts at {starts_at}")]
    NotStarted {
        code: String,
        starts_at: DateTime<Utc>,
    },

    #[error("Promotion '{code}' expired at {ended_at}")]
    Expired {
        code: String,
        ended_at: DateTime<Utc>,
    },

    /// The definition references products the catalogue does not have.
    #[error("Promotion '{code}' references missing products: {}", product_ids.join(", "))]
    MissingProducts {
        code: String,
        product_ids: Vec<String>,
    },

    /// The definition cannot be evaluated (e.g. "buy 0").
    #[error("Promotion '{code}' is misconfigured: {reason}")]
    Misconfigured { code: String, reason: String },
}

// =============================================================================
// Loyalty Error
// =============================================================================

/// Point redemption failures. Each aborts the order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoyaltyError {
    /// The usable points fall below the programme minimum.
    #[error(
        "Only {usable} points can be redeemed on this order (requested {requested}); the minimum redemption is {minimum}"
    )]
    BelowMinimumRedemption {
        requested: i64,
        usable: i64,
        minimum: i64,
    },

    /// Points were requested without naming a loyalty account.
    #[error("Point redemption requires a loyalty account")]
    AccountRequired,

    #[error("Loyalty account not found: {0}")]
    AccountNotFound(String),

    #[error("Point value must be positive, got {0}")]
    InvalidPointValue(Money),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
