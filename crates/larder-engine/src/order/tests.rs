//! Order engine scenarios against an in-memory database.

use super::*;
use chrono::{Duration, TimeZone};
use larder_core::promotion::{
    BuyXGetYRule, DiscountScope, DiscountValue, Eligibility, PromotionStatus,
};
use larder_core::{LineQuantity, Promotion, PromotionKind, RateBps, UnitType, ValidationError};
use larder_db::DbConfig;

use crate::error::{FailureCode, NotEligibleError};

// =============================================================================
// Fixtures
// =============================================================================

async fn engine_with(config: EngineConfig) -> OrderEngine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    OrderEngine::new(db, config)
}

async fn engine() -> OrderEngine {
    engine_with(EngineConfig::default()).await
}

async fn add_product(engine: &OrderEngine, sku: &str, unit_type: UnitType, price: i64) -> Product {
    let now = Utc::now();
    engine
        .db()
        .products()
        .insert(&Product {
            id: uuid::Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: format!("{} item", sku),
            category: "Grocery".to_string(),
            cost_price: Money::new(price * 70 / 100),
            sell_price: Money::new(price),
            unit_type,
            current_stock: 0,
            expiry_notification_days: 3,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}

/// Adds a batch received `days_ago` days back.
async fn add_batch(engine: &OrderEngine, product_id: &str, quantity: i64, days_ago: i64) -> String {
    engine
        .inventory()
        .restock(product_id, quantity, 30, Utc::now() - Duration::days(days_ago))
        .await
        .unwrap()
        .batch
        .id
}

async fn add_promotion(
    engine: &OrderEngine,
    code: &str,
    kind: PromotionKind,
    max_discount: Option<Money>,
) -> Promotion {
    engine
        .db()
        .promotions()
        .insert(&Promotion {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: code.to_string(),
            kind,
            min_quantity: None,
            max_discount,
            starts_at: Utc::now() - Duration::days(1),
            ends_at: None,
            status: PromotionStatus::Active,
        })
        .await
        .unwrap()
}

fn request(lines: Vec<OrderLineRequest>, paid: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        lines,
        payments: vec![PaymentRequest::cash(paid)],
        ..Default::default()
    }
}

async fn remaining(engine: &OrderEngine, batch_id: &str) -> i64 {
    engine
        .db()
        .batches()
        .get_by_id(batch_id)
        .await
        .unwrap()
        .unwrap()
        .quantity_remaining
}

async fn current_stock(engine: &OrderEngine, product_id: &str) -> i64 {
    engine
        .db()
        .products()
        .get_by_id(product_id)
        .await
        .unwrap()
        .unwrap()
        .current_stock
}

// =============================================================================
// Totals
// =============================================================================

#[tokio::test]
async fn test_totals_identity_with_weighed_line_and_promotion() {
    let engine = engine().await;
    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    let banana = add_product(&engine, "BANANA", UnitType::Weighed, 22_000).await;
    add_batch(&engine, &milk.id, 10, 2).await;
    add_batch(&engine, &banana.id, 5_000, 1).await;
    add_promotion(
        &engine,
        "FRESH10",
        PromotionKind::ProductDiscount {
            scope: DiscountScope::WeighedOnly,
            value: DiscountValue::Percent(RateBps::from_percent(10)),
        },
        None,
    )
    .await;

    let mut req = request(
        vec![
            OrderLineRequest::units(&milk.id, 2),
            OrderLineRequest::grams(&banana.id, 750),
        ],
        100_000,
    );
    req.promotion_code = Some("fresh10".to_string());

    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();
    let order = &created.order;

    // 2 × 21,500 + 750 g at 22,000/kg
    assert_eq!(created.lines[0].subtotal, Money::new(43_000));
    assert_eq!(created.lines[1].subtotal, Money::new(16_500));
    assert_eq!(order.subtotal, Money::new(59_500));
    assert_eq!(order.promo_discount, Money::new(1_650));

    let line_sum: Money = created.lines.iter().map(|l| l.subtotal).sum();
    assert_eq!(line_sum - order.discount(), order.total);
    assert!(!order.total.is_negative());
    assert_eq!(order.change, order.amount_paid - order.total);

    let line_discounts: Money = created.lines.iter().map(|l| l.discount).sum();
    assert_eq!(line_discounts, order.promo_discount);
    assert_eq!(created.lines[0].discount, Money::zero());
    assert_eq!(order.promotion_code.as_deref(), Some("FRESH10"));

    assert_eq!(current_stock(&engine, &milk.id).await, 8);
    assert_eq!(current_stock(&engine, &banana.id).await, 4_250);
}

#[tokio::test]
async fn test_percent_discount_capped_by_max_discount() {
    let engine = engine().await;
    let wine = add_product(&engine, "WINE", UnitType::FixedUnit, 10_000).await;
    add_batch(&engine, &wine.id, 30, 1).await;
    add_promotion(
        &engine,
        "TENOFF",
        PromotionKind::ProductDiscount {
            scope: DiscountScope::All,
            value: DiscountValue::Percent(RateBps::from_percent(10)),
        },
        Some(Money::new(15_000)),
    )
    .await;

    let mut req = request(vec![OrderLineRequest::units(&wine.id, 20)], 200_000);
    req.promotion_code = Some("TENOFF".to_string());

    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(created.order.subtotal, Money::new(200_000));
    assert_eq!(created.order.promo_discount, Money::new(15_000));
    assert_eq!(created.order.total, Money::new(185_000));
    assert_eq!(created.order.change, Money::new(15_000));
}

#[tokio::test]
async fn test_payment_shortfall_names_amount() {
    let engine = engine().await;
    let bread = add_product(&engine, "BREAD", UnitType::FixedUnit, 16_000).await;
    add_batch(&engine, &bread.id, 5, 1).await;

    let req = request(vec![OrderLineRequest::units(&bread.id, 2)], 30_000);
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        OrderError::PaymentShortfall {
            total, shortfall, ..
        } => {
            assert_eq!(total, Money::new(32_000));
            assert_eq!(shortfall, Money::new(2_000));
        }
        other => panic!("expected PaymentShortfall, got {other:?}"),
    }
    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_price_override_replaces_catalogue_price() {
    let engine = engine().await;
    let cake = add_product(&engine, "CAKE", UnitType::FixedUnit, 50_000).await;
    add_batch(&engine, &cake.id, 3, 1).await;

    let req = request(
        vec![OrderLineRequest::units(&cake.id, 1).with_price(Money::new(25_000))],
        25_000,
    );
    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(created.lines[0].unit_price, Money::new(25_000));
    assert_eq!(created.order.total, Money::new(25_000));
    assert_eq!(created.order.change, Money::zero());
}

#[tokio::test]
async fn test_amounts_beyond_money_range_are_rejected() {
    let engine = engine().await;
    let cake = add_product(&engine, "CAKE", UnitType::FixedUnit, 50_000).await;
    let batch = add_batch(&engine, &cake.id, 5, 1).await;
    let cancel = CancellationToken::new();

    let req = CreateOrderRequest {
        lines: vec![OrderLineRequest::units(&cake.id, 1)],
        payments: vec![PaymentRequest::cash(i64::MAX), PaymentRequest::cash(i64::MAX)],
        ..Default::default()
    };
    let err = engine.create_order(&req, &cancel).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(ValidationError::OutOfRange { .. })));

    let req = request(
        vec![OrderLineRequest::units(&cake.id, 3).with_price(Money::new(i64::MAX / 2))],
        50_000,
    );
    let err = engine.create_order(&req, &cancel).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(ValidationError::OutOfRange { .. })));

    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(remaining(&engine, &batch).await, 5);
}

#[tokio::test]
async fn test_stored_price_that_overflows_the_line_is_rejected() {
    let engine = engine().await;
    let cake = add_product(&engine, "CAKE", UnitType::FixedUnit, 50_000).await;
    let batch = add_batch(&engine, &cake.id, 5, 1).await;

    sqlx::query("UPDATE products SET sell_price = ? WHERE id = ?")
        .bind(i64::MAX / 2)
        .bind(&cake.id)
        .execute(engine.db().pool())
        .await
        .unwrap();

    let req = request(vec![OrderLineRequest::units(&cake.id, 3)], 50_000);
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::Validation(ValidationError::OutOfRange { .. })));
    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(remaining(&engine, &batch).await, 5);
}

// =============================================================================
// FIFO Allocation
// =============================================================================

#[tokio::test]
async fn test_fifo_consumes_only_oldest_batch() {
    let engine = engine().await;
    let yog = add_product(&engine, "YOG", UnitType::FixedUnit, 9_500).await;
    let t1 = add_batch(&engine, &yog.id, 5, 3).await;
    let t2 = add_batch(&engine, &yog.id, 5, 1).await;

    let req = request(vec![OrderLineRequest::units(&yog.id, 4)], 50_000);
    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.allocations.len(), 1);
    assert_eq!(created.allocations[0].batch_id, t1);
    assert_eq!(created.allocations[0].quantity, 4);
    assert_eq!(remaining(&engine, &t1).await, 1);
    assert_eq!(remaining(&engine, &t2).await, 5);
    assert_eq!(current_stock(&engine, &yog.id).await, 6);
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let engine = engine().await;
    let yog = add_product(&engine, "YOG", UnitType::FixedUnit, 9_500).await;
    let t1 = add_batch(&engine, &yog.id, 3, 2).await;
    let t2 = add_batch(&engine, &yog.id, 2, 1).await;

    let req = request(vec![OrderLineRequest::units(&yog.id, 6)], 100_000);
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        OrderError::InsufficientStock {
            sku,
            requested,
            available,
            shortfall,
            ..
        } => {
            assert_eq!(sku, "YOG");
            assert_eq!(*requested, 6);
            assert_eq!(*available, 5);
            assert_eq!(*shortfall, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert!(err.to_string().contains("short 1"));

    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(remaining(&engine, &t1).await, 3);
    assert_eq!(remaining(&engine, &t2).await, 2);
    assert_eq!(current_stock(&engine, &yog.id).await, 5);
}

#[tokio::test]
async fn test_stock_drained_after_precheck_rolls_back() {
    let engine = engine().await;
    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    let batch = add_batch(&engine, &milk.id, 3, 2).await;
    let day = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();

    let req = request(vec![OrderLineRequest::units(&milk.id, 2)], 50_000);
    let draft = validate_request(&req).unwrap();
    let priced = engine.price(draft, day).await.unwrap();
    let allocated = engine.check_stock(priced).await.unwrap();

    // Another till takes stock between the pre-check and the transaction.
    engine.inventory().adjust_out(&milk.id, 2, "spoiled").await.unwrap();

    let err = match engine.persist(&allocated, day).await {
        Err(err) => err,
        Ok(_) => panic!("persist should fail once the batch is drained"),
    };
    assert!(matches!(
        err,
        OrderError::InsufficientStock { requested: 2, available: 1, .. }
    ));

    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(remaining(&engine, &batch).await, 1);
    assert_eq!(current_stock(&engine, &milk.id).await, 1);

    // The rolled-back transaction did not use up the day's first number.
    add_batch(&engine, &milk.id, 5, 0).await;
    let created = engine
        .create_order_at(&req, day, &CancellationToken::new())
        .await
        .unwrap();
    assert!(created.order.order_number.ends_with("-20260314-0001"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("larder.db")))
        .await
        .unwrap();
    let engine = OrderEngine::new(db, EngineConfig::default());

    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    let batch = add_batch(&engine, &milk.id, 3, 1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let req = request(vec![OrderLineRequest::units(&milk.id, 2)], 50_000);
        handles.push(tokio::spawn(async move {
            engine.create_order(&req, &CancellationToken::new()).await
        }));
    }

    let (mut ok, mut insufficient) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(OrderError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected order failure: {other:?}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(insufficient, 7);
    assert_eq!(remaining(&engine, &batch).await, 1);
    assert_eq!(current_stock(&engine, &milk.id).await, 1);
    assert_eq!(engine.db().orders().count().await.unwrap(), 1);

    engine.db().close().await;
}

#[tokio::test]
async fn test_lines_of_one_product_share_the_stock_check() {
    let engine = engine().await;
    let egg = add_product(&engine, "EGG", UnitType::FixedUnit, 2_000).await;
    add_batch(&engine, &egg.id, 5, 1).await;

    // Each line fits on its own; together they do not.
    let req = request(
        vec![
            OrderLineRequest::units(&egg.id, 3),
            OrderLineRequest::units(&egg.id, 3),
        ],
        20_000,
    );
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::InsufficientStock { requested: 6, available: 5, .. }
    ));
}

#[tokio::test]
async fn test_allocation_trail_splits_lines_across_batches() {
    let engine = engine().await;
    let egg = add_product(&engine, "EGG", UnitType::FixedUnit, 2_000).await;
    let b1 = add_batch(&engine, &egg.id, 5, 2).await;
    let b2 = add_batch(&engine, &egg.id, 5, 1).await;

    let req = request(
        vec![
            OrderLineRequest::units(&egg.id, 3),
            OrderLineRequest::units(&egg.id, 4),
        ],
        20_000,
    );
    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();

    let first = &created.lines[0].id;
    let second = &created.lines[1].id;
    let trail: Vec<(&str, &str, i64)> = created
        .allocations
        .iter()
        .map(|a| (a.order_line_id.as_str(), a.batch_id.as_str(), a.quantity))
        .collect();
    assert_eq!(
        trail,
        vec![
            (first.as_str(), b1.as_str(), 3),
            (second.as_str(), b1.as_str(), 2),
            (second.as_str(), b2.as_str(), 2),
        ]
    );

    let detail = engine
        .order_detail(&created.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.allocations.len(), 3);
    assert_eq!(detail.lines.len(), 2);
    assert_eq!(detail.payments.len(), 1);
    assert_eq!(remaining(&engine, &b2).await, 3);
}

#[test]
fn test_split_allocations_walks_plan_in_order() {
    let plan = vec![
        BatchAllocation {
            batch_id: "b1".into(),
            quantity: 4,
        },
        BatchAllocation {
            batch_id: "b2".into(),
            quantity: 3,
        },
    ];
    let out = split_allocations(&plan, &[("l1", 2), ("l2", 5)]);
    let got: Vec<(&str, &str, i64)> = out
        .iter()
        .map(|a| (a.order_line_id.as_str(), a.batch_id.as_str(), a.quantity))
        .collect();
    assert_eq!(got, vec![("l1", "b1", 2), ("l2", "b1", 2), ("l2", "b2", 3)]);
}

// =============================================================================
// Promotions
// =============================================================================

#[tokio::test]
async fn test_buy_one_get_one_same_product() {
    let engine = engine().await;
    let yog = add_product(&engine, "YOG", UnitType::FixedUnit, 9_500).await;
    add_promotion(
        &engine,
        "YOGB1G1",
        PromotionKind::BuyXGetY(BuyXGetYRule::SameProduct {
            product_id: yog.id.clone(),
            buy: 1,
            get: 1,
        }),
        None,
    )
    .await;
    let now = Utc::now();

    let two = engine
        .evaluate_promotion("YOGB1G1", &[OrderLineRequest::units(&yog.id, 2)], now)
        .await
        .unwrap();
    assert!(two.is_applied());
    assert_eq!(two.discount, Money::new(9_500));

    let three = engine
        .evaluate_promotion("YOGB1G1", &[OrderLineRequest::units(&yog.id, 3)], now)
        .await
        .unwrap();
    assert_eq!(three.discount, Money::new(9_500));

    let one = engine
        .evaluate_promotion("YOGB1G1", &[OrderLineRequest::units(&yog.id, 1)], now)
        .await
        .unwrap();
    assert_eq!(one.discount, Money::zero());
    assert!(matches!(one.eligibility, Eligibility::NotEligible(_)));
}

#[tokio::test]
async fn test_buy_two_a_get_one_b_capped_to_cart() {
    let engine = engine().await;
    let bread = add_product(&engine, "BREAD", UnitType::FixedUnit, 16_000).await;
    let butter = add_product(&engine, "BUTTER", UnitType::FixedUnit, 32_000).await;
    add_batch(&engine, &bread.id, 10, 1).await;
    add_batch(&engine, &butter.id, 10, 1).await;
    add_promotion(
        &engine,
        "BREADBUTTER",
        PromotionKind::BuyXGetY(BuyXGetYRule::DifferentProducts {
            buy_product_id: bread.id.clone(),
            buy: 2,
            get_product_id: butter.id.clone(),
            get: 1,
        }),
        None,
    )
    .await;

    let mut req = request(
        vec![
            OrderLineRequest::units(&bread.id, 4),
            OrderLineRequest::units(&butter.id, 1),
        ],
        100_000,
    );
    req.promotion_code = Some("BREADBUTTER".to_string());

    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(created.order.promo_discount, Money::new(32_000));
    assert_eq!(created.lines[1].discount, Money::new(32_000));
    assert_eq!(created.order.total, Money::new(64_000));
}

#[tokio::test]
async fn test_unqualified_cart_still_orders_without_discount() {
    let engine = engine().await;
    let yog = add_product(&engine, "YOG", UnitType::FixedUnit, 9_500).await;
    add_batch(&engine, &yog.id, 5, 1).await;
    add_promotion(
        &engine,
        "YOGB1G1",
        PromotionKind::BuyXGetY(BuyXGetYRule::SameProduct {
            product_id: yog.id.clone(),
            buy: 1,
            get: 1,
        }),
        None,
    )
    .await;

    let mut req = request(vec![OrderLineRequest::units(&yog.id, 1)], 10_000);
    req.promotion_code = Some("YOGB1G1".to_string());

    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(created.order.promo_discount, Money::zero());
    assert!(created.order.promotion_code.is_none());
    let evaluation = created.promotion.unwrap();
    assert!(!evaluation.is_applied());
    assert!(evaluation.message().contains("YOGB1G1"));
}

#[tokio::test]
async fn test_structural_promotion_errors_abort() {
    let engine = engine().await;
    let yog = add_product(&engine, "YOG", UnitType::FixedUnit, 9_500).await;
    let gone = add_product(&engine, "GONE", UnitType::FixedUnit, 1_000).await;
    add_batch(&engine, &yog.id, 5, 1).await;
    add_promotion(
        &engine,
        "GHOST",
        PromotionKind::Bundle {
            product_ids: vec![yog.id.clone(), gone.id.clone()],
            pricing: larder_core::promotion::BundlePricing::FixedPrice(Money::new(5_000)),
        },
        None,
    )
    .await;
    engine.db().products().soft_delete(&gone.id).await.unwrap();

    let mut req = request(vec![OrderLineRequest::units(&yog.id, 1)], 10_000);
    req.promotion_code = Some("NOPE".to_string());
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotEligible(NotEligibleError::Promotion(PromotionError::NotFound(_)))
    ));

    req.promotion_code = Some("GHOST".to_string());
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotEligible(NotEligibleError::Promotion(
            PromotionError::MissingProducts { .. }
        ))
    ));

    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(current_stock(&engine, &yog.id).await, 5);
}

#[tokio::test]
async fn test_evaluate_promotion_is_idempotent_and_read_only() {
    let engine = engine().await;
    let apple = add_product(&engine, "APPLE", UnitType::Weighed, 48_000).await;
    let batch = add_batch(&engine, &apple.id, 2_000, 1).await;
    add_promotion(
        &engine,
        "FRESH10",
        PromotionKind::ProductDiscount {
            scope: DiscountScope::WeighedOnly,
            value: DiscountValue::Percent(RateBps::from_percent(10)),
        },
        None,
    )
    .await;

    let cart = vec![OrderLineRequest::grams(&apple.id, 1_250)];
    let now = Utc::now();
    let first = engine.evaluate_promotion("FRESH10", &cart, now).await.unwrap();
    let second = engine.evaluate_promotion("FRESH10", &cart, now).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.discount, Money::new(6_000));
    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(remaining(&engine, &batch).await, 2_000);
}

// =============================================================================
// Loyalty
// =============================================================================

#[tokio::test]
async fn test_redemption_clamped_to_balance_and_subtotal() {
    let mut config = EngineConfig::default();
    config.loyalty.point_value = 10;
    let engine = engine_with(config).await;

    let gum = add_product(&engine, "GUM", UnitType::FixedUnit, 300).await;
    add_batch(&engine, &gum.id, 5, 1).await;
    let account = engine
        .db()
        .loyalty()
        .create("Ayu", 50, engine.loyalty_program())
        .await
        .unwrap();

    let mut req = request(vec![OrderLineRequest::units(&gum.id, 1)], 1_000);
    req.customer_account_id = Some(account.id.clone());
    req.redeem_points = 80;

    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();

    // min(80, 50, 300 / 10) = 30 points → 300
    assert_eq!(created.order.points_redeemed, 30);
    assert_eq!(created.order.point_discount, Money::new(300));
    assert_eq!(created.order.total, Money::zero());
    assert_eq!(created.order.points_earned, 0);
    assert!(created.warnings.is_empty());

    let balance = engine.db().loyalty().get_balance(&account.id).await.unwrap();
    assert_eq!(balance, 20);
}

#[tokio::test]
async fn test_redemption_below_minimum_aborts() {
    let engine = engine().await;
    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    add_batch(&engine, &milk.id, 5, 1).await;
    let account = engine
        .db()
        .loyalty()
        .create("Bima", 5, engine.loyalty_program())
        .await
        .unwrap();

    let mut req = request(vec![OrderLineRequest::units(&milk.id, 1)], 30_000);
    req.customer_account_id = Some(account.id.clone());
    req.redeem_points = 5;

    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotEligible(NotEligibleError::Loyalty(
            LoyaltyError::BelowMinimumRedemption { usable: 5, minimum: 10, .. }
        ))
    ));

    req.customer_account_id = None;
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), FailureCode::LoyaltyNotEligible);

    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(engine.db().loyalty().get_balance(&account.id).await.unwrap(), 5);
}

#[tokio::test]
async fn test_accrual_moves_tier_after_commit() {
    let engine = engine().await;
    let rice = add_product(&engine, "RICE", UnitType::FixedUnit, 60_000).await;
    add_batch(&engine, &rice.id, 5, 1).await;
    let account = engine
        .db()
        .loyalty()
        .create("Citra", 495, engine.loyalty_program())
        .await
        .unwrap();
    assert_eq!(account.tier, "bronze");

    let mut req = request(vec![OrderLineRequest::units(&rice.id, 1)], 60_000);
    req.customer_account_id = Some(account.id.clone());

    let created = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap();

    // 60,000 / 10,000 per point
    assert_eq!(created.order.points_earned, 6);
    let settled = created.loyalty.unwrap();
    assert_eq!(settled.point_balance, 501);
    assert_eq!(settled.tier, "silver");
}

#[tokio::test]
async fn test_unknown_account_aborts_before_writes() {
    let engine = engine().await;
    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    add_batch(&engine, &milk.id, 5, 1).await;

    let mut req = request(vec![OrderLineRequest::units(&milk.id, 1)], 30_000);
    req.customer_account_id = Some("no-such-account".to_string());

    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::NotEligible(NotEligibleError::Loyalty(LoyaltyError::AccountNotFound(_)))
    ));
    assert_eq!(current_stock(&engine, &milk.id).await, 5);
}

// =============================================================================
// Validation, Cancellation, Numbering
// =============================================================================

#[tokio::test]
async fn test_unknown_or_inactive_product_is_unavailable() {
    let engine = engine().await;
    let old = add_product(&engine, "OLD", UnitType::FixedUnit, 5_000).await;
    engine.db().products().soft_delete(&old.id).await.unwrap();

    for product_id in [old.id.as_str(), "missing"] {
        let req = request(vec![OrderLineRequest::units(product_id, 1)], 10_000);
        let err = engine
            .create_order(&req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ProductUnavailable(ref id) if id == product_id));
    }
}

#[tokio::test]
async fn test_quantity_kind_must_match_unit_type() {
    let engine = engine().await;
    let banana = add_product(&engine, "BANANA", UnitType::Weighed, 22_000).await;
    add_batch(&engine, &banana.id, 5_000, 1).await;

    let req = request(vec![OrderLineRequest::units(&banana.id, 2)], 50_000);
    let err = engine
        .create_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::Validation(larder_core::ValidationError::UnitMismatch { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_token_writes_nothing() {
    let engine = engine().await;
    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    let batch = add_batch(&engine, &milk.id, 5, 1).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let req = request(vec![OrderLineRequest::units(&milk.id, 2)], 50_000);
    let err = engine.create_order(&req, &cancel).await.unwrap_err();

    assert!(matches!(err, OrderError::Cancelled));
    assert_eq!(engine.db().orders().count().await.unwrap(), 0);
    assert_eq!(remaining(&engine, &batch).await, 5);
}

#[tokio::test]
async fn test_order_numbers_follow_prefix_and_day() {
    let mut config = EngineConfig::default();
    config.store.order_prefix = "TILL2".to_string();
    let engine = engine_with(config).await;

    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    add_batch(&engine, &milk.id, 10, 1).await;

    let day = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
    let req = request(vec![OrderLineRequest::units(&milk.id, 1)], 50_000);
    let cancel = CancellationToken::new();

    let first = engine.create_order_at(&req, day, &cancel).await.unwrap();
    let second = engine
        .create_order_at(&req, day + Duration::hours(2), &cancel)
        .await
        .unwrap();
    let next_day = engine
        .create_order_at(&req, day + Duration::days(1), &cancel)
        .await
        .unwrap();

    assert_eq!(first.order.order_number, "TILL2-20260314-0001");
    assert_eq!(second.order.order_number, "TILL2-20260314-0002");
    assert_eq!(next_day.order.order_number, "TILL2-20260315-0001");

    let stored = engine
        .db()
        .orders()
        .get_by_number("TILL2-20260314-0002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, second.order.id);
}

#[tokio::test]
async fn test_submit_order_wraps_outcome() {
    let engine = engine().await;
    let milk = add_product(&engine, "MILK", UnitType::FixedUnit, 21_500).await;
    add_batch(&engine, &milk.id, 1, 1).await;
    let cancel = CancellationToken::new();

    let ok = engine
        .submit_order(&request(vec![OrderLineRequest::units(&milk.id, 1)], 25_000), &cancel)
        .await;
    assert!(ok.success);
    assert!(ok.failure.is_none());
    assert_eq!(ok.order.as_ref().unwrap().order.change, Money::new(3_500));

    let failed = engine
        .submit_order(&request(vec![OrderLineRequest::units(&milk.id, 1)], 25_000), &cancel)
        .await;
    assert!(!failed.success);
    assert!(failed.order.is_none());
    assert_eq!(failed.failure.unwrap().code, FailureCode::InsufficientStock);

    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["order"]["order"]["order_number"].is_string());
}

#[test]
fn test_product_demand_groups_by_product() {
    let product = |id: &str| Product {
        id: id.to_string(),
        sku: id.to_uppercase(),
        name: id.to_string(),
        category: "Grocery".to_string(),
        cost_price: Money::new(500),
        sell_price: Money::new(1_000),
        unit_type: UnitType::FixedUnit,
        current_stock: 0,
        expiry_notification_days: 3,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let a = product("a");
    let b = product("b");
    let lines = vec![
        CartLine::priced(0, &a, LineQuantity::Units(2), None).unwrap(),
        CartLine::priced(1, &b, LineQuantity::Units(1), None).unwrap(),
        CartLine::priced(2, &a, LineQuantity::Units(3), None).unwrap(),
    ];

    let demand = product_demand(&lines);
    assert_eq!(demand.len(), 2);
    assert_eq!(demand[0].product_id, "a");
    assert_eq!(demand[0].needed, 5);
    assert_eq!(demand[0].line_indexes, vec![0, 2]);
    assert_eq!(demand[1].needed, 1);
}
