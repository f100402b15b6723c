//! # Order Orchestrator
//!
//! Turns a [`CreateOrderRequest`] into a committed order.
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       create_order pipeline                             │
//! │                                                                         │
//! │  Draft ──────► validate_request()          pure                        │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  Priced ─────► catalogue snapshot          reads only                  │
//! │    │           promotion + points resolved                             │
//! │    │           totals, payment check                                   │
//! │    ▼                                                                    │
//! │  Allocated ──► FIFO plan per product       reads only                  │
//! │    │           (early InsufficientStock)                               │
//! │    ▼                                                                    │
//! │  Persisted ──► BEGIN                                                   │
//! │    │             next order number  ◄── first statement is a write     │
//! │    │             header, lines, payments                               │
//! │    │             guarded FIFO decrements + allocation trail            │
//! │    ▼                                                                    │
//! │  Committed ──► COMMIT                                                  │
//! │                loyalty settle (best effort, warnings only)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure before `Committed` leaves the database untouched: the
//! transaction is dropped, and sqlx rolls it back.
//!
//! Cancellation is checked before the transaction opens, raced against the
//! persistence writes, and checked once more before `COMMIT`. The commit
//! itself is not interrupted.

mod request;

#[cfg(test)]
mod tests;

pub use request::{CreateOrderRequest, OrderLineRequest, PaymentRequest};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};
use ts_rs::TS;

use larder_core::ledger::plan_fifo;
use larder_core::pricing::checked_cart_subtotal;
use larder_core::promotion::{check_catalog, evaluate, validate as validate_promotion};
use larder_core::validation::validate_line_quantity;
use larder_core::{
    BatchAllocation, CartLine, CoreError, LoyaltyAccount, LoyaltyError, LoyaltyProgram, Money,
    Order, OrderLine, OrderLineAllocation, OrderStatus, Payment, PointRedemption, Product,
    PromotionError, PromotionEvaluation,
};
use larder_db::repository::{batch, order};
use larder_db::{Database, DbError};

use crate::config::EngineConfig;
use crate::error::{EngineResult, OrderError, OrderResult, PostCommitWarning};
use crate::inventory::InventoryService;
use request::{optional_promotion_code, validate_lines, validate_request, Draft};

// =============================================================================
// Results
// =============================================================================

/// A committed order as the till sees it.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct CreatedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
    /// Which batches supplied each line.
    pub allocations: Vec<OrderLineAllocation>,
    /// Present whenever a code was entered, applied or not.
    pub promotion: Option<PromotionEvaluation>,
    /// Account state after settlement, when it succeeded.
    pub loyalty: Option<LoyaltyAccount>,
    pub warnings: Vec<PostCommitWarning>,
}

/// A stored order with its lines, payments and allocation trail.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
    pub allocations: Vec<OrderLineAllocation>,
}

// =============================================================================
// Stage Types
// =============================================================================

/// Lines priced, discounts resolved, totals known.
#[derive(Debug)]
struct PricedOrder {
    lines: Vec<CartLine>,
    subtotal: Money,
    promotion: Option<PromotionEvaluation>,
    redemption: PointRedemption,
    total: Money,
    amount_paid: Money,
    change: Money,
    account: Option<LoyaltyAccount>,
    points_earned: i64,
    payments: Vec<PaymentRequest>,
    cashier_id: Option<String>,
    notes: Option<String>,
}

impl PricedOrder {
    fn promo_discount(&self) -> Money {
        self.promotion
            .as_ref()
            .map(|p| p.discount)
            .unwrap_or_default()
    }

    /// Code recorded on the order: only when it actually discounted.
    fn applied_code(&self) -> Option<String> {
        self.promotion
            .as_ref()
            .filter(|p| p.is_applied())
            .map(|p| p.code.clone())
    }

    fn line_discount(&self, index: usize) -> Money {
        self.promotion
            .as_ref()
            .map(|p| p.discount_for_line(index))
            .unwrap_or_default()
    }
}

/// Base units one product needs across the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProductDemand {
    product_id: String,
    needed: i64,
    /// Cart lines of this product, in cart order.
    line_indexes: Vec<usize>,
}

/// Stock pre-checked against the batch snapshot.
#[derive(Debug)]
struct AllocatedOrder {
    priced: PricedOrder,
    demand: Vec<ProductDemand>,
}

/// Rows written inside the open transaction.
#[derive(Debug)]
struct Persisted {
    order: Order,
    lines: Vec<OrderLine>,
    payments: Vec<Payment>,
    allocations: Vec<OrderLineAllocation>,
}

// =============================================================================
// Engine
// =============================================================================

/// The order orchestrator.
///
/// Cheap to clone and safe to share between tasks.
///
/// ## Usage
/// ```rust,ignore
/// let engine = OrderEngine::new(db, EngineConfig::load(None)?);
/// let cancel = CancellationToken::new();
///
/// let created = engine.create_order(&request, &cancel).await?;
/// println!("{} total {}", created.order.order_number, created.order.total);
/// ```
#[derive(Debug, Clone)]
pub struct OrderEngine {
    db: Database,
    config: Arc<EngineConfig>,
    program: Arc<LoyaltyProgram>,
}

impl OrderEngine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let program = config.loyalty.program();
        OrderEngine {
            db,
            config: Arc::new(config),
            program: Arc::new(program),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loyalty_program(&self) -> &LoyaltyProgram {
        &self.program
    }

    /// Stock movements and expiry reports over the same database.
    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(self.db.clone(), &self.config)
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Creates an order stamped with the current time.
    pub async fn create_order(
        &self,
        request: &CreateOrderRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<CreatedOrder> {
        self.create_order_at(request, Utc::now(), cancel).await
    }

    /// Creates an order as of `now`.
    ///
    /// `now` drives promotion windows and the order number's date.
    pub async fn create_order_at(
        &self,
        request: &CreateOrderRequest,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EngineResult<CreatedOrder> {
        let span = info_span!(
            "create_order",
            lines = request.lines.len(),
            order_number = field::Empty
        );

        async move {
            if cancel.is_cancelled() {
                return Err(OrderError::Cancelled);
            }

            let draft = validate_request(request)?;
            debug!("Draft validated");

            let priced = self.price(draft, now).await?;
            debug!(
                subtotal = priced.subtotal.amount(),
                promo_discount = priced.promo_discount().amount(),
                point_discount = priced.redemption.discount.amount(),
                total = priced.total.amount(),
                "Order priced"
            );

            let allocated = self.check_stock(priced).await?;
            debug!(products = allocated.demand.len(), "Stock pre-check passed");

            if cancel.is_cancelled() {
                info!("Order cancelled before persistence");
                return Err(OrderError::Cancelled);
            }

            let (tx, persisted) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Order cancelled during persistence, rolling back");
                    return Err(OrderError::Cancelled);
                }
                result = self.persist(&allocated, now) => result?,
            };

            if cancel.is_cancelled() {
                info!(
                    order_number = %persisted.order.order_number,
                    "Order cancelled before commit, rolling back"
                );
                drop(tx);
                return Err(OrderError::Cancelled);
            }

            tx.commit().await.map_err(DbError::from)?;

            info!(
                order_id = %persisted.order.id,
                order_number = %persisted.order.order_number,
                total = persisted.order.total.amount(),
                lines = persisted.lines.len(),
                "Order committed"
            );

            let (loyalty, warnings) = self.settle_loyalty(&allocated.priced).await;

            let AllocatedOrder { priced, .. } = allocated;
            Ok(CreatedOrder {
                order: persisted.order,
                lines: persisted.lines,
                payments: persisted.payments,
                allocations: persisted.allocations,
                promotion: priced.promotion,
                loyalty,
                warnings,
            })
        }
        .instrument(span)
        .await
    }

    /// [`Self::create_order`] wrapped in the serialisable result.
    pub async fn submit_order(
        &self,
        request: &CreateOrderRequest,
        cancel: &CancellationToken,
    ) -> OrderResult {
        let result = self.create_order(request, cancel).await;
        if let Err(e) = &result {
            warn!(code = ?e.code(), "Order failed: {}", e);
        }
        OrderResult::from(result)
    }

    /// Previews a promotion against a cart. Reads only.
    ///
    /// Gives the same answer `create_order` would for the same cart and
    /// time, and may be called any number of times.
    pub async fn evaluate_promotion(
        &self,
        code: &str,
        lines: &[OrderLineRequest],
        now: DateTime<Utc>,
    ) -> EngineResult<PromotionEvaluation> {
        validate_lines(lines)?;
        let code = optional_promotion_code(Some(code))?.ok_or_else(|| {
            larder_core::ValidationError::Required {
                field: "promotion code".to_string(),
            }
        })?;

        let cart = self.price_lines(lines).await?;
        let evaluation = self.resolve_promotion(&code, &cart, now).await?;

        debug!(
            code = %code,
            discount = evaluation.discount.amount(),
            applied = evaluation.is_applied(),
            "Promotion previewed"
        );

        Ok(evaluation)
    }

    /// Loads a stored order with its lines, payments and trail.
    pub async fn order_detail(&self, order_id: &str) -> EngineResult<Option<OrderDetail>> {
        let orders = self.db.orders();
        let Some(order) = orders.get_by_id(order_id).await? else {
            return Ok(None);
        };

        let lines = orders.get_lines(order_id).await?;
        let payments = orders.get_payments(order_id).await?;
        let allocations = orders.get_allocations(order_id).await?;

        Ok(Some(OrderDetail {
            order,
            lines,
            payments,
            allocations,
        }))
    }

    // =========================================================================
    // Priced
    // =========================================================================

    async fn price(&self, draft: Draft<'_>, now: DateTime<Utc>) -> EngineResult<PricedOrder> {
        let request = draft.request;

        let lines = self.price_lines(&request.lines).await?;
        let subtotal = checked_cart_subtotal(&lines).ok_or_else(|| out_of_range("subtotal"))?;

        let promotion = match &draft.promotion_code {
            Some(code) => Some(self.resolve_promotion(code, &lines, now).await?),
            None => None,
        };
        let promo_discount = promotion
            .as_ref()
            .map(|p| p.discount)
            .unwrap_or_default();

        let account = match &draft.customer_account_id {
            Some(id) => Some(
                self.db
                    .loyalty()
                    .get(id)
                    .await?
                    .ok_or_else(|| LoyaltyError::AccountNotFound(id.clone()))?,
            ),
            None => None,
        };

        let redemption = if request.redeem_points > 0 {
            let account = account.as_ref().ok_or(LoyaltyError::AccountRequired)?;
            self.program
                .redeem(request.redeem_points, account.point_balance, subtotal)?
        } else {
            PointRedemption::default()
        };

        let discount = promo_discount + redemption.discount;
        if discount > subtotal {
            return Err(OrderError::NegativeTotal { subtotal, discount });
        }
        let total = subtotal - discount;

        let amount_paid = Money::checked_sum(request.payments.iter().map(|p| p.amount))
            .ok_or_else(|| out_of_range("payments"))?;
        if amount_paid < total {
            return Err(OrderError::PaymentShortfall {
                total,
                paid: amount_paid,
                shortfall: total - amount_paid,
            });
        }

        let points_earned = if account.is_some() {
            self.program.accrue(total)
        } else {
            0
        };

        Ok(PricedOrder {
            lines,
            subtotal,
            promotion,
            redemption,
            total,
            amount_paid,
            change: amount_paid - total,
            account,
            points_earned,
            payments: request.payments.clone(),
            cashier_id: request.cashier_id.clone(),
            notes: request.notes.clone(),
        })
    }

    /// Prices request lines against a catalogue snapshot.
    async fn price_lines(&self, requested: &[OrderLineRequest]) -> EngineResult<Vec<CartLine>> {
        let mut ids: Vec<String> = requested.iter().map(|l| l.product_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let products: HashMap<String, Product> = self
            .db
            .products()
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut lines = Vec::with_capacity(requested.len());
        for (index, line) in requested.iter().enumerate() {
            let product = products
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| OrderError::ProductUnavailable(line.product_id.clone()))?;

            validate_line_quantity(&product.sku, product.unit_type, &line.quantity)?;

            lines.push(CartLine::priced(
                index,
                product,
                line.quantity,
                line.unit_price_override,
            )?);
        }

        Ok(lines)
    }

    /// Looks up, checks and evaluates a promotion against a priced cart.
    ///
    /// Structural failures are errors; a cart that simply does not qualify
    /// comes back as an evaluation with zero discount.
    async fn resolve_promotion(
        &self,
        code: &str,
        cart: &[CartLine],
        now: DateTime<Utc>,
    ) -> EngineResult<PromotionEvaluation> {
        let promotion = self
            .db
            .promotions()
            .get_by_code(code)
            .await?
            .ok_or_else(|| PromotionError::NotFound(code.to_string()))?;

        validate_promotion(&promotion, now)?;

        let referenced = promotion.kind.referenced_product_ids();
        let existing = self.db.products().existing_ids(&referenced).await?;
        check_catalog(&promotion, |id| existing.contains(id))?;

        let evaluation = evaluate(&promotion, cart, now)?;
        debug!(code = %evaluation.code, "{}", evaluation.message());

        Ok(evaluation)
    }

    // =========================================================================
    // Allocated
    // =========================================================================

    /// Plans every product's FIFO allocation against the current batches.
    async fn check_stock(&self, priced: PricedOrder) -> EngineResult<AllocatedOrder> {
        let demand = product_demand(&priced.lines);
        let batches = self.db.batches();

        for item in &demand {
            let available = batches.list_available(&item.product_id).await?;
            let plan = plan_fifo(&item.product_id, &available, item.needed).map_err(|e| match e {
                CoreError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                } => stock_error(&priced.lines, product_id, requested, available),
                other => OrderError::Persistence(other.into()),
            })?;

            debug!(
                product_id = %item.product_id,
                needed = item.needed,
                batches = plan.len(),
                "FIFO plan"
            );
        }

        Ok(AllocatedOrder { priced, demand })
    }

    // =========================================================================
    // Persisted
    // =========================================================================

    /// Writes the order inside a new transaction and hands the transaction
    /// back uncommitted.
    async fn persist(
        &self,
        allocated: &AllocatedOrder,
        now: DateTime<Utc>,
    ) -> EngineResult<(Transaction<'static, Sqlite>, Persisted)> {
        let priced = &allocated.priced;
        let mut tx = self.db.begin().await?;

        let order_number =
            order::next_order_number(&mut *tx, self.config.order_prefix(), now).await?;
        Span::current().record("order_number", order_number.as_str());

        let header = Order {
            id: order::generate_order_id(),
            order_number,
            customer_account_id: priced.account.as_ref().map(|a| a.id.clone()),
            promotion_code: priced.applied_code(),
            subtotal: priced.subtotal,
            promo_discount: priced.promo_discount(),
            point_discount: priced.redemption.discount,
            total: priced.total,
            amount_paid: priced.amount_paid,
            change: priced.change,
            points_redeemed: priced.redemption.points,
            points_earned: priced.points_earned,
            status: OrderStatus::Completed,
            cashier_id: priced.cashier_id.clone(),
            notes: priced.notes.clone(),
            created_at: now,
        };
        order::insert_order(&mut *tx, &header).await?;

        let mut lines = Vec::with_capacity(priced.lines.len());
        for cart_line in &priced.lines {
            let line = OrderLine {
                id: order::generate_order_id(),
                order_id: header.id.clone(),
                product_id: Some(cart_line.product_id.clone()),
                sku: cart_line.sku.clone(),
                name: cart_line.name.clone(),
                category: cart_line.category.clone(),
                unit_type: cart_line.unit_type,
                unit_price: cart_line.unit_price,
                cost_price: cart_line.cost_price,
                quantity: cart_line.quantity,
                subtotal: cart_line.subtotal,
                discount: priced.line_discount(cart_line.index),
                created_at: now,
            };
            order::insert_line(&mut *tx, &line, cart_line.index as i64 + 1).await?;
            lines.push(line);
        }

        let mut payments = Vec::with_capacity(priced.payments.len());
        for tendered in &priced.payments {
            let payment = Payment {
                id: order::generate_order_id(),
                order_id: header.id.clone(),
                method: tendered.method,
                amount: tendered.amount,
                reference: tendered.reference.clone(),
                created_at: now,
            };
            order::insert_payment(&mut *tx, &payment).await?;
            payments.push(payment);
        }

        let mut allocations = Vec::new();
        for item in &allocated.demand {
            let plan = batch::allocate_fifo(&mut *tx, &item.product_id, item.needed, now)
                .await
                .map_err(|e| match e {
                    DbError::InsufficientStock {
                        product_id,
                        requested,
                        available,
                    } => stock_error(&priced.lines, product_id, requested, available),
                    other => OrderError::Persistence(other),
                })?;

            let line_needs: Vec<(&str, i64)> = item
                .line_indexes
                .iter()
                .map(|&i| (lines[i].id.as_str(), lines[i].quantity.base_units()))
                .collect();

            for allocation in split_allocations(&plan, &line_needs) {
                order::insert_allocation(&mut *tx, &allocation).await?;
                allocations.push(allocation);
            }
        }

        debug!(
            order_id = %header.id,
            allocations = allocations.len(),
            "Order rows written"
        );

        Ok((
            tx,
            Persisted {
                order: header,
                lines,
                payments,
                allocations,
            },
        ))
    }

    // =========================================================================
    // Committed
    // =========================================================================

    /// Applies redemption and accrual after commit.
    ///
    /// Failures never undo the order; they come back as warnings.
    async fn settle_loyalty(
        &self,
        priced: &PricedOrder,
    ) -> (Option<LoyaltyAccount>, Vec<PostCommitWarning>) {
        let Some(account) = &priced.account else {
            return (None, Vec::new());
        };

        let redeemed = priced.redemption.points;
        let accrued = priced.points_earned;
        if redeemed == 0 && accrued == 0 {
            return (Some(account.clone()), Vec::new());
        }

        match self
            .db
            .loyalty()
            .settle(&account.id, redeemed, accrued, &self.program)
            .await
        {
            Ok(updated) => {
                if updated.tier != account.tier {
                    info!(
                        account_id = %updated.id,
                        from = %account.tier,
                        to = %updated.tier,
                        "Loyalty tier changed"
                    );
                }
                (Some(updated), Vec::new())
            }
            Err(e) => {
                warn!(
                    account_id = %account.id,
                    redeemed = redeemed,
                    accrued = accrued,
                    "Loyalty settlement failed after commit: {}",
                    e
                );
                (
                    None,
                    vec![PostCommitWarning::LoyaltySettlementFailed {
                        account_id: account.id.clone(),
                        redeemed,
                        accrued,
                        reason: e.to_string(),
                    }],
                )
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// An order amount that does not fit in [`Money`].
fn out_of_range(field: &str) -> OrderError {
    larder_core::ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}

/// Groups cart lines by product, in order of first appearance.
fn product_demand(lines: &[CartLine]) -> Vec<ProductDemand> {
    let mut demand: Vec<ProductDemand> = Vec::new();
    for line in lines {
        let needed = line.quantity.base_units();
        match demand.iter_mut().find(|d| d.product_id == line.product_id) {
            Some(existing) => {
                existing.needed += needed;
                existing.line_indexes.push(line.index);
            }
            None => demand.push(ProductDemand {
                product_id: line.product_id.clone(),
                needed,
                line_indexes: vec![line.index],
            }),
        }
    }
    demand
}

/// Hands a product's FIFO plan out to its lines, first line first.
///
/// `line_needs` pairs each line id with its base units; the plan covers
/// their sum exactly.
fn split_allocations(
    plan: &[BatchAllocation],
    line_needs: &[(&str, i64)],
) -> Vec<OrderLineAllocation> {
    let mut out = Vec::new();
    let mut steps = plan.iter().map(|s| (s.batch_id.as_str(), s.quantity));
    let mut current = steps.next();

    for &(line_id, mut outstanding) in line_needs {
        while outstanding > 0 {
            let Some((batch_id, left)) = current else {
                break;
            };
            let take = outstanding.min(left);
            out.push(OrderLineAllocation {
                order_line_id: line_id.to_string(),
                batch_id: batch_id.to_string(),
                quantity: take,
            });
            outstanding -= take;
            current = if left > take {
                Some((batch_id, left - take))
            } else {
                steps.next()
            };
        }
    }

    out
}

/// Builds the cashier-facing stock error for a product in the cart.
fn stock_error(
    lines: &[CartLine],
    product_id: String,
    requested: i64,
    available: i64,
) -> OrderError {
    let (sku, name) = lines
        .iter()
        .find(|l| l.product_id == product_id)
        .map(|l| (l.sku.clone(), l.name.clone()))
        .unwrap_or_else(|| (product_id.clone(), String::new()));

    warn!(
        product_id = %product_id,
        sku = %sku,
        requested = requested,
        available = available,
        shortfall = requested - available,
        "Insufficient stock"
    );

    OrderError::InsufficientStock {
        product_id,
        sku,
        name,
        requested,
        available,
        shortfall: requested - available,
    }
}
