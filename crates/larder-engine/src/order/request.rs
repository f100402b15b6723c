//! Order request DTOs and the `Draft` stage check.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use larder_core::validation::{
    normalize_promotion_code, validate_line_count, validate_payment_amount,
    validate_payment_count, validate_points, validate_price,
};
use larder_core::{LineQuantity, Money, PaymentMethod, ValidationError};

/// One cart line as entered at the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLineRequest {
    pub product_id: String,
    /// Pieces for fixed-unit products, grams for weighed ones.
    pub quantity: LineQuantity,
    /// Cashier-entered unit price replacing the catalogue price.
    #[serde(default)]
    pub unit_price_override: Option<Money>,
}

impl OrderLineRequest {
    pub fn units(product_id: impl Into<String>, units: i64) -> Self {
        OrderLineRequest {
            product_id: product_id.into(),
            quantity: LineQuantity::Units(units),
            unit_price_override: None,
        }
    }

    pub fn grams(product_id: impl Into<String>, grams: i64) -> Self {
        OrderLineRequest {
            product_id: product_id.into(),
            quantity: LineQuantity::Grams(grams),
            unit_price_override: None,
        }
    }

    pub fn with_price(mut self, unit_price: Money) -> Self {
        self.unit_price_override = Some(unit_price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn cash(amount: i64) -> Self {
        PaymentRequest {
            method: PaymentMethod::Cash,
            amount: Money::new(amount),
            reference: None,
        }
    }
}

/// Everything needed to create one order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateOrderRequest {
    pub lines: Vec<OrderLineRequest>,
    pub payments: Vec<PaymentRequest>,
    #[serde(default)]
    pub promotion_code: Option<String>,
    /// Loyalty account to redeem from and accrue to.
    #[serde(default)]
    pub customer_account_id: Option<String>,
    /// Points the customer asked to spend. Zero means none.
    #[serde(default)]
    pub redeem_points: i64,
    #[serde(default)]
    pub cashier_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

// =============================================================================
// Draft Stage
// =============================================================================

/// A request whose shape has been checked.
///
/// Quantity kinds are checked later, once the products are known.
#[derive(Debug)]
pub(crate) struct Draft<'a> {
    pub request: &'a CreateOrderRequest,
    /// Normalised code; a blank code counts as none.
    pub promotion_code: Option<String>,
    pub customer_account_id: Option<String>,
}

/// Checks the request shape. Pure: nothing is read or written.
pub(crate) fn validate_request(request: &CreateOrderRequest) -> Result<Draft<'_>, ValidationError> {
    validate_lines(&request.lines)?;

    validate_payment_count(request.payments.len())?;
    for payment in &request.payments {
        validate_payment_amount(payment.amount)?;
    }

    validate_points(request.redeem_points)?;

    let promotion_code = optional_promotion_code(request.promotion_code.as_deref())?;

    let customer_account_id = match request.customer_account_id.as_deref().map(str::trim) {
        Some("") => {
            return Err(ValidationError::Required {
                field: "customer account".to_string(),
            })
        }
        Some(id) => Some(id.to_string()),
        None => None,
    };

    Ok(Draft {
        request,
        promotion_code,
        customer_account_id,
    })
}

/// Line checks shared by order creation and promotion previews.
pub(crate) fn validate_lines(lines: &[OrderLineRequest]) -> Result<(), ValidationError> {
    validate_line_count(lines.len())?;

    for line in lines {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product".to_string(),
            });
        }
        if line.quantity.base_units() <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
        if let Some(price) = line.unit_price_override {
            validate_price(price)?;
        }
    }

    Ok(())
}

pub(crate) fn optional_promotion_code(
    code: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(normalize_promotion_code)
        .transpose()
}
