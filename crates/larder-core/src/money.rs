//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  0.1 + 0.2 = 0.30000000000000004                                        │
//! │                                                                         │
//! │  A weighed line of 0.755 kg at 32,500/kg must come out the same on      │
//! │  the receipt, in the order row and in the till count.                   │
//! │                                                                         │
//! │  OUR SOLUTION: integer amounts in the smallest currency unit            │
//! │    755 g × 32,500 / 1000 = 24,537 (truncated, explicitly)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use larder_core::money::{Money, RateBps};
//!
//! let price = Money::new(12_500);
//! let line = price.times(3);
//! assert_eq!(line.amount(), 37_500);
//!
//! let ten_percent = RateBps::from_percent(10);
//! assert_eq!(Money::new(200_000).percentage(ten_percent).amount(), 20_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate values may go negative (a discount larger
///   than a subtotal is detected, not wrapped)
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **No currency code**: the store runs in exactly one currency
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.sell_price ──► OrderLine.unit_price ──► OrderLine.subtotal     │
/// │                                                                         │
/// │  Σ subtotals ──► − promo discount − point discount ──► Order.total      │
/// │                                                                         │
/// │  Σ payments − Order.total ──► Order.change                             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from an amount in the smallest currency unit.
    #[inline]
    pub const fn new(amount: i64) -> Self {
        Money(amount)
    }

    /// Returns the raw amount in the smallest currency unit.
    #[inline]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a piece count, saturating at the `i64`
    /// bounds.
    ///
    /// ```rust
    /// use larder_core::money::Money;
    ///
    /// assert_eq!(Money::new(4_500).times(3), Money::new(13_500));
    /// ```
    #[inline]
    pub const fn times(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Multiplies by a piece count; `None` on overflow.
    #[inline]
    pub const fn checked_times(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Adds two amounts; `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Sums amounts; `None` if any partial sum overflows.
    ///
    /// ```rust
    /// use larder_core::money::Money;
    ///
    /// let ok = [Money::new(5), Money::new(7)];
    /// assert_eq!(Money::checked_sum(ok), Some(Money::new(12)));
    /// assert_eq!(Money::checked_sum([Money::new(i64::MAX), Money::new(1)]), None);
    /// ```
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Prices a weighed quantity from a per-kilogram price.
    ///
    /// The multiplication happens before the division so that sub-kilogram
    /// weights are not lost; the result is truncated toward zero.
    ///
    /// ```rust
    /// use larder_core::money::Money;
    ///
    /// let per_kg = Money::new(32_500);
    /// assert_eq!(per_kg.for_grams(755), Money::new(24_537));
    /// assert_eq!(per_kg.for_grams(1_000), per_kg);
    /// ```
    pub fn for_grams(&self, grams: i64) -> Self {
        let value = self.0 as i128 * grams as i128 / 1000;
        Money(clamp_i128(value))
    }

    /// Weighed pricing; `None` when the result does not fit in `i64`.
    pub fn checked_for_grams(&self, grams: i64) -> Option<Self> {
        let value = self.0 as i128 * grams as i128 / 1000;
        i64::try_from(value).ok().map(Money)
    }

    /// Returns `rate` of this amount, rounded half up.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`
    pub fn percentage(&self, rate: RateBps) -> Money {
        let value = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money(clamp_i128(value))
    }

    /// Subtraction that stops at zero.
    #[inline]
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

fn clamp_i128(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// =============================================================================
// Rate (basis points)
// =============================================================================

/// A percentage expressed in basis points (1 bps = 0.01%).
///
/// 1000 bps = 10%. Used for percent promotions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RateBps(u32);

impl RateBps {
    /// Upper bound: 100%.
    pub const MAX: RateBps = RateBps(10_000);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        RateBps(bps)
    }

    /// Creates a rate from a whole percentage (10 → 10%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        RateBps(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// True when the rate lies in `0..=100%`.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 <= Self::MAX.0
    }
}

impl fmt::Display for RateBps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            write!(f, "{}%", whole)
        } else {
            write!(f, "{}.{:02}%", whole, frac)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================
//
// Operators saturate at the `i64` bounds instead of panicking. Validated
// inputs never get near them; callers that must detect overflow use the
// `checked_*` methods.

/// Shows the amount with thousands separators, e.g. `200,000`.
///
/// Cashier-facing messages embed this form; the UI applies its own currency
/// symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-{}", grouped)
        } else {
            write!(f, "{}", grouped)
        }
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.times(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
