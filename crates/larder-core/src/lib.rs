//! # larder-core: Pure Business Logic for Larder POS
//!
//! This crate is the **heart** of the order fulfillment engine. It contains
//! the business rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Larder POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Callers (till UI, CLI, HTTP)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              larder-engine (order orchestrator)                 │   │
//! │  │    validate ──► price ──► promote ──► redeem ──► allocate      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ larder-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐ │   │
//! │  │   │  types  │ │ pricing │ │ ledger  │ │promotion │ │loyalty │ │   │
//! │  │   │ Product │ │CartLine │ │  FIFO   │ │evaluator │ │ redeem │ │   │
//! │  │   │  Order  │ │ weighed │ │ expiry  │ │attribute │ │ accrue │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  larder-db (Database Layer)                     │   │
//! │  │        SQLite queries, migrations, transactional ledger         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Batch, Order, Payment, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Line pricing for fixed-unit and weighed products
//! - [`ledger`] - FIFO planning and expiry status for stock batches
//! - [`promotion`] - Promotion definitions and the evaluator
//! - [`loyalty`] - Point redemption, accrual and tiers
//! - [`error`] - Domain error types
//! - [`validation`] - Request validation
//!
//! ## Example Usage
//!
//! ```rust
//! use larder_core::money::Money;
//! use larder_core::loyalty::redeem_points;
//!
//! // 80 points requested, 50 on the account, subtotal worth 30 points
//! let r = redeem_points(80, 50, Money::new(300), Money::new(10), 1).unwrap();
//! assert_eq!(r.points, 30);
//! assert_eq!(r.discount, Money::new(300));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod loyalty;
pub mod money;
pub mod pricing;
pub mod promotion;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use larder_core::Money` instead of
// `use larder_core::money::Money`

pub use error::{CoreError, CoreResult, LoyaltyError, PromotionError, ValidationError};
pub use ledger::{BatchAllocation, BatchStatus};
pub use loyalty::{LoyaltyProgram, PointRedemption, Tier};
pub use money::{Money, RateBps};
pub use pricing::CartLine;
pub use promotion::{Eligibility, Promotion, PromotionEvaluation, PromotionKind};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed on a single order.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum piece count on one line.
///
/// ## Business Reason
/// Catches typing 1000 instead of 10 at the till.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum weight on one weighed line (100 kg).
pub const MAX_LINE_WEIGHT_GRAMS: i64 = 100_000;

/// Largest amount accepted for a price or a single payment, in minor units.
///
/// Keeps every order total well inside `i64`: 100 lines of 999 pieces at
/// this price still fits.
pub const MAX_MONEY: i64 = 1_000_000_000_000;

/// Maximum payments (tenders) on a single order.
pub const MAX_PAYMENTS: usize = 20;

/// Longest shelf life, or expiry notification threshold, in days (100 years).
pub const MAX_SHELF_LIFE_DAYS: i64 = 36_500;

/// Notification threshold used when a product does not set its own.
pub const DEFAULT_EXPIRY_NOTIFICATION_DAYS: i64 = 3;
