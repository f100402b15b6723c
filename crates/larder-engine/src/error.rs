//! # Order Errors
//!
//! What a caller of [`crate::OrderEngine`] sees when an order does not go
//! through, plus the serialisable result wrapper for UI callers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where Each Failure Happens                           │
//! │                                                                         │
//! │  Draft      ── ValidationError ───────────────┐                        │
//! │  Priced     ── ProductUnavailable             │   zero writes,         │
//! │             ── NotEligible (promo / points)   ├── safe to retry        │
//! │             ── NegativeTotal                  │   after correction     │
//! │             ── PaymentShortfall               │                        │
//! │  Allocated  ── InsufficientStock (snapshot) ──┘                        │
//! │                                                                         │
//! │  Persisted  ── InsufficientStock (guarded decrement)  ┐  rolled back,  │
//! │             ── Cancelled                               ├─ nothing      │
//! │             ── Persistence(DbError)                    ┘  committed    │
//! │                                                                         │
//! │  Committed  ── PostCommitWarning (loyalty) ── order stands, warning    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! ```json
//! {
//!   "success": false,
//!   "message": "Insufficient stock for DRY-YOG-150 (Greek Yogurt 150g): requested 6, available 5 (short 1)",
//!   "order": null,
//!   "failure": { "code": "INSUFFICIENT_STOCK", "message": "..." }
//! }
//! ```

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use larder_core::{LoyaltyError, Money, PromotionError, ValidationError};
use larder_db::DbError;

use crate::order::CreatedOrder;

// =============================================================================
// Order Error
// =============================================================================

/// A promotion or point redemption that cannot be honoured at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotEligibleError {
    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),
}

/// Order creation failures.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request is malformed.
    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    /// Promotion code or point redemption rejected.
    #[error("{0}")]
    NotEligible(#[from] NotEligibleError),

    /// A line names a product that is unknown or no longer sold.
    #[error("Product {0} is not available for sale")]
    ProductUnavailable(String),

    /// Batch stock cannot cover a line. Nothing was written.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: 6 × DRY-YOG-150
    ///      │
    ///      ▼
    /// Batches: 3 + 2 remaining
    ///      │
    ///      ▼
    /// "Insufficient stock for DRY-YOG-150 (Greek Yogurt 150g):
    ///  requested 6, available 5 (short 1)"
    ///      │
    ///      ▼
    /// Cashier lowers the quantity and resubmits
    /// ```
    #[error(
        "Insufficient stock for {sku} ({name}): requested {requested}, available {available} (short {shortfall})"
    )]
    InsufficientStock {
        product_id: String,
        sku: String,
        name: String,
        requested: i64,
        available: i64,
        shortfall: i64,
    },

    /// Tendered payments do not cover the total.
    #[error("Payment short by {shortfall}: total {total}, paid {paid}")]
    PaymentShortfall {
        total: Money,
        paid: Money,
        shortfall: Money,
    },

    /// Discounts exceed the subtotal.
    #[error("Discounts of {discount} exceed the subtotal of {subtotal}")]
    NegativeTotal { subtotal: Money, discount: Money },

    /// The caller cancelled before the order committed.
    #[error("Order was cancelled before it was saved")]
    Cancelled,

    /// Storage failed. The order was not committed.
    #[error("Order could not be saved: {0}")]
    Persistence(#[from] DbError),
}

impl From<PromotionError> for OrderError {
    fn from(err: PromotionError) -> Self {
        OrderError::NotEligible(NotEligibleError::Promotion(err))
    }
}

impl From<LoyaltyError> for OrderError {
    fn from(err: LoyaltyError) -> Self {
        OrderError::NotEligible(NotEligibleError::Loyalty(err))
    }
}

impl OrderError {
    /// Machine-readable code for this failure.
    pub fn code(&self) -> FailureCode {
        match self {
            OrderError::Validation(_) => FailureCode::ValidationError,
            OrderError::NotEligible(NotEligibleError::Promotion(_)) => {
                FailureCode::PromotionNotEligible
            }
            OrderError::NotEligible(NotEligibleError::Loyalty(_)) => {
                FailureCode::LoyaltyNotEligible
            }
            OrderError::ProductUnavailable(_) => FailureCode::ProductUnavailable,
            OrderError::InsufficientStock { .. } => FailureCode::InsufficientStock,
            OrderError::PaymentShortfall { .. } => FailureCode::PaymentShortfall,
            OrderError::NegativeTotal { .. } => FailureCode::NegativeTotal,
            OrderError::Cancelled => FailureCode::Cancelled,
            OrderError::Persistence(_) => FailureCode::PersistenceError,
        }
    }

    /// Message for the cashier.
    ///
    /// Storage details are logged, not shown.
    pub fn user_message(&self) -> String {
        match self {
            OrderError::Persistence(e) => {
                tracing::error!("Order persistence failed: {}", e);
                "The order could not be saved. Nothing was charged; please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True when nothing was written and the request can be fixed and resent.
    pub fn is_correctable(&self) -> bool {
        !matches!(self, OrderError::Persistence(_) | OrderError::Cancelled)
    }
}

pub type EngineResult<T> = Result<T, OrderError>;

// =============================================================================
// Post-Commit Warning
// =============================================================================

/// Something that went wrong after the order committed.
///
/// The order stands. The warning tells the cashier the customer's balance
/// may need attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS, Error)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostCommitWarning {
    #[error(
        "Loyalty balance for account {account_id} was not updated (redeem {redeemed}, earn {accrued}): {reason}"
    )]
    LoyaltySettlementFailed {
        account_id: String,
        redeemed: i64,
        accrued: i64,
        reason: String,
    },
}

// =============================================================================
// Serialisable Result
// =============================================================================

/// Failure codes for order results.
///
/// ## Usage in Frontend
/// ```typescript
/// const result = await submitOrder(request);
/// if (!result.success) {
///   switch (result.failure.code) {
///     case 'INSUFFICIENT_STOCK':
///       highlightLine(result.failure.message);
///       break;
///     case 'PAYMENT_SHORTFALL':
///       reopenTender();
///       break;
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    ValidationError,
    ProductUnavailable,
    PromotionNotEligible,
    LoyaltyNotEligible,
    InsufficientStock,
    PaymentShortfall,
    NegativeTotal,
    Cancelled,
    PersistenceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Failure {
    pub code: FailureCode,
    pub message: String,
}

/// Outcome of `OrderEngine::submit_order`.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct OrderResult {
    pub success: bool,
    pub message: String,
    pub order: Option<CreatedOrder>,
    pub failure: Option<Failure>,
}

impl OrderResult {
    pub fn committed(order: CreatedOrder) -> Self {
        let message = if order.warnings.is_empty() {
            format!("Order {} completed", order.order.order_number)
        } else {
            format!(
                "Order {} completed with {} warning(s)",
                order.order.order_number,
                order.warnings.len()
            )
        };

        OrderResult {
            success: true,
            message,
            order: Some(order),
            failure: None,
        }
    }

    pub fn failed(err: &OrderError) -> Self {
        let message = err.user_message();
        OrderResult {
            success: false,
            message: message.clone(),
            order: None,
            failure: Some(Failure {
                code: err.code(),
                message,
            }),
        }
    }
}

impl From<Result<CreatedOrder, OrderError>> for OrderResult {
    fn from(result: Result<CreatedOrder, OrderError>) -> Self {
        match result {
            Ok(order) => OrderResult::committed(order),
            Err(err) => OrderResult::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_code_serialization() {
        let json = serde_json::to_string(&FailureCode::InsufficientStock).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_STOCK\"");
    }

    #[test]
    fn test_insufficient_stock_message_names_product() {
        let err = OrderError::InsufficientStock {
            product_id: "p-1".into(),
            sku: "DRY-YOG-150".into(),
            name: "Greek Yogurt".into(),
            requested: 6,
            available: 5,
            shortfall: 1,
        };

        let result = OrderResult::failed(&err);
        assert!(!result.success);
        assert!(result.message.contains("DRY-YOG-150"));
        assert!(result.message.contains("short 1"));
        assert_eq!(result.failure.unwrap().code, FailureCode::InsufficientStock);
    }

    #[test]
    fn test_persistence_message_is_generic() {
        let err = OrderError::Persistence(DbError::QueryFailed("disk I/O error".into()));
        assert_eq!(err.code(), FailureCode::PersistenceError);
        assert!(!err.user_message().contains("disk"));
        assert!(!err.is_correctable());
    }

    #[test]
    fn test_loyalty_rejection_maps_to_not_eligible() {
        let err: OrderError = LoyaltyError::AccountRequired.into();
        assert_eq!(err.code(), FailureCode::LoyaltyNotEligible);
        assert!(err.is_correctable());
    }
}
