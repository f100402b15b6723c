//! # Domain Types
//!
//! Core domain types used throughout Larder POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Batch       │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  product_id     │   │  id (UUID)      │       │
//! │  │  sku (business) │   │  received_at    │   │  order_number   │       │
//! │  │  unit_type      │   │  remaining      │   │  subtotal/total │       │
//! │  │  sell_price     │   │  expires_at     │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                       │                 │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────▼────────┐       │
//! │  │ LoyaltyAccount  │   │    Payment      │   │   OrderLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  point_balance  │   │  method         │   │  sku snapshot   │       │
//! │  │  tier (derived) │   │  amount         │   │  quantity       │       │
//! │  └─────────────────┘   └─────────────────┘   │  subtotal       │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Base Units
//! Stock, batch quantities and allocations are counted in the product's base
//! unit: pieces for fixed-unit products, grams for weighed products.
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, order_number) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::ledger::{self, BatchStatus};
use crate::money::Money;

// =============================================================================
// Unit Type
// =============================================================================

/// How a product is sold and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Sold by weight; priced per kilogram, stocked in grams.
    Weighed,
    /// Sold by the piece.
    FixedUnit,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Weighed => "weighed",
            UnitType::FixedUnit => "fixed_unit",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    pub category: String,

    /// Purchase cost per piece (or per kilogram for weighed products).
    pub cost_price: Money,

    /// Selling price per piece (or per kilogram for weighed products).
    pub sell_price: Money,

    pub unit_type: UnitType,

    /// Aggregate stock in base units. Tracks the sum of batch remainders.
    pub current_stock: i64,

    /// A batch expiring within this many days counts as nearing expiry.
    pub expiry_notification_days: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// True when `quantity` is given in the unit this product is sold in.
    pub fn accepts(&self, quantity: &LineQuantity) -> bool {
        matches!(
            (self.unit_type, quantity),
            (UnitType::FixedUnit, LineQuantity::Units(_))
                | (UnitType::Weighed, LineQuantity::Grams(_))
        )
    }
}

// =============================================================================
// Batch
// =============================================================================

/// One received lot of a product.
///
/// ## Lifecycle
/// ```text
/// restock ──► Batch { remaining = received } ──► orders consume FIFO
///                                                   │
///                                                   ▼
///                                   remaining = 0 (kept, never deleted)
/// ```
///
/// The status is never stored: call [`Batch::status`] with the current clock
/// and the product's notification threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Batch {
    pub id: String,
    pub product_id: String,
    pub quantity_received: i64,
    pub quantity_remaining: i64,
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    pub shelf_life_days: i64,
    /// Always `received_at + shelf_life_days`.
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Derives the batch status at `now`.
    pub fn status(&self, now: DateTime<Utc>, notification_days: i64) -> BatchStatus {
        ledger::derive_status(self.expires_at, now, notification_days)
    }

    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        ledger::days_until_expiry(self.expires_at, now)
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.quantity_remaining > 0
    }
}

// =============================================================================
// Line Quantity
// =============================================================================

/// Quantity on an order line: a piece count or a weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineQuantity {
    /// Pieces of a fixed-unit product.
    Units(i64),
    /// Grams of a weighed product.
    Grams(i64),
}

impl LineQuantity {
    /// The quantity in base units (pieces or grams).
    #[inline]
    pub fn base_units(&self) -> i64 {
        match *self {
            LineQuantity::Units(n) | LineQuantity::Grams(n) => n,
        }
    }

    pub fn units(&self) -> Option<i64> {
        match *self {
            LineQuantity::Units(n) => Some(n),
            LineQuantity::Grams(_) => None,
        }
    }

    pub fn grams(&self) -> Option<i64> {
        match *self {
            LineQuantity::Grams(g) => Some(g),
            LineQuantity::Units(_) => None,
        }
    }

    /// Human label of the kind, used in validation messages.
    pub fn kind_label(&self) -> &'static str {
        match self {
            LineQuantity::Units(_) => "in units",
            LineQuantity::Grams(_) => "in grams",
        }
    }
}

impl fmt::Display for LineQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineQuantity::Units(n) => write!(f, "{} pcs", n),
            LineQuantity::Grams(g) => write!(f, "{} g", g),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of a committed order.
///
/// Orders are created `Completed`. Later transitions belong to the returns
/// workflow:
/// ```text
/// Completed ──► PartiallyReturned ──► Returned
///     │                 │
///     │                 └──────────────► Returned
///     ├──► Returned
///     └──► Voided
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Completed,
    PartiallyReturned,
    Returned,
    Voided,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Completed => "completed",
            OrderStatus::PartiallyReturned => "partially_returned",
            OrderStatus::Returned => "returned",
            OrderStatus::Voided => "voided",
        }
    }

    /// Whether an order in this status may move to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Completed, PartiallyReturned)
                | (Completed, Returned)
                | (Completed, Voided)
                | (PartiallyReturned, PartiallyReturned)
                | (PartiallyReturned, Returned)
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Completed
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// QR / e-wallet transfer.
    EWallet,
    BankTransfer,
}

// =============================================================================
// Order
// =============================================================================

/// A committed sale.
///
/// `total = subtotal - promo_discount - point_discount` and
/// `change = amount_paid - total`, both never negative.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Human-facing number, unique: `<prefix>-YYYYMMDD-NNNN`.
    pub order_number: String,
    pub customer_account_id: Option<String>,
    /// Code of the promotion that was applied, if any.
    pub promotion_code: Option<String>,
    pub subtotal: Money,
    pub promo_discount: Money,
    pub point_discount: Money,
    pub total: Money,
    pub amount_paid: Money,
    pub change: Money,
    pub points_redeemed: i64,
    pub points_earned: i64,
    pub status: OrderStatus,
    pub cashier_id: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Total discount (promotion plus points).
    #[inline]
    pub fn discount(&self) -> Money {
        self.promo_discount + self.point_discount
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// A line item in an order.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    /// `None` once the product has been deleted from the catalogue.
    pub product_id: Option<String>,
    /// SKU at time of sale (frozen).
    pub sku: String,
    /// Product name at time of sale (frozen).
    pub name: String,
    pub category: String,
    pub unit_type: UnitType,
    /// Price per piece, or per kilogram for weighed lines.
    pub unit_price: Money,
    /// Cost per piece (or kilogram) at time of sale.
    pub cost_price: Money,
    pub quantity: LineQuantity,
    /// Line total before discounts.
    pub subtotal: Money,
    /// This line's share of the promotion discount.
    pub discount: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Allocation Trail
// =============================================================================

/// How much of an order line was taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLineAllocation {
    pub order_line_id: String,
    pub batch_id: String,
    /// Base units taken from the batch.
    pub quantity: i64,
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards an order.
/// An order can have multiple payments for split tender scenarios.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount: Money,
    /// External reference (card auth code, transfer id, etc.).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Loyalty Account
// =============================================================================

/// A customer's loyalty balance.
///
/// `tier` is a snapshot of the classification derived from `point_balance`;
/// it is rewritten on every balance update and may go down as well as up.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyAccount {
    pub id: String,
    pub customer_name: String,
    pub point_balance: i64,
    pub tier: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
