//! # Seed Data Generator
//!
//! Populates the database with a small grocery store for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./larder_dev.db
//! cargo run -p larder-db --bin seed
//!
//! # Specify database path
//! cargo run -p larder-db --bin seed -- --db ./data/larder.db
//! ```
//!
//! ## Generated Data
//! - Fixed-unit products (dairy, bakery, pantry) priced per piece
//! - Weighed products (produce, meat, bulk) priced per kilogram
//! - Two to three batches per product, received on different days so FIFO
//!   and expiry reports have something to show
//! - One promotion of each kind
//! - A handful of loyalty accounts spread over the tiers

use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use larder_core::promotion::{
    BundlePricing, BuyXGetYRule, DiscountScope, DiscountValue, PromotionStatus,
};
use larder_core::{LoyaltyProgram, Money, Product, Promotion, PromotionKind, RateBps, UnitType};
use larder_db::repository::batch::NewBatch;
use larder_db::{Database, DbConfig};

/// (sku, name, category, unit type, sell price, shelf life days)
///
/// Prices are per piece for fixed-unit products and per kilogram for weighed
/// ones.
const CATALOGUE: &[(&str, &str, &str, UnitType, i64, i64)] = &[
    ("DRY-MILK-1L", "Fresh Milk 1L", "Dairy", UnitType::FixedUnit, 21_500, 7),
    ("DRY-YOG-150", "Greek Yogurt 150g", "Dairy", UnitType::FixedUnit, 9_500, 14),
    ("DRY-BUT-200", "Butter 200g", "Dairy", UnitType::FixedUnit, 32_000, 60),
    ("BAK-BRD-WHT", "White Bread", "Bakery", UnitType::FixedUnit, 16_000, 4),
    ("BAK-CRS-PLN", "Croissant", "Bakery", UnitType::FixedUnit, 12_000, 2),
    ("PAN-PST-500", "Spaghetti 500g", "Pantry", UnitType::FixedUnit, 18_500, 365),
    ("PAN-SAU-TOM", "Tomato Sauce", "Pantry", UnitType::FixedUnit, 14_000, 270),
    ("PRD-BAN", "Bananas", "Produce", UnitType::Weighed, 22_000, 5),
    ("PRD-APL-FUJ", "Fuji Apples", "Produce", UnitType::Weighed, 48_000, 21),
    ("PRD-TOM", "Tomatoes", "Produce", UnitType::Weighed, 26_000, 6),
    ("MT-CHK-BRS", "Chicken Breast", "Meat", UnitType::Weighed, 72_000, 3),
    ("BLK-RICE", "Jasmine Rice (bulk)", "Bulk", UnitType::Weighed, 16_500, 180),
];

/// (name, opening balance)
const ACCOUNTS: &[(&str, i64)] = &[
    ("Ayu Lestari", 40),
    ("Bima Santoso", 650),
    ("Citra Dewi", 2_400),
    ("Dimas Pratama", 12_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./larder_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Larder POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./larder_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Larder POS Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Products and batches
    println!();
    println!("Generating catalogue...");

    let now = Utc::now();
    let mut products = Vec::new();
    let mut batches = 0;

    for (idx, (sku, name, category, unit_type, price, shelf_life)) in CATALOGUE.iter().enumerate() {
        let product = db
            .products()
            .insert(&generate_product(sku, name, category, *unit_type, *price))
            .await?;

        // Oldest lot first so FIFO has something to drain.
        let lots = 2 + idx % 2;
        for lot in 0..lots {
            let quantity = match unit_type {
                UnitType::FixedUnit => 12 + (idx as i64 * 5) % 30,
                UnitType::Weighed => 5_000 + (idx as i64 * 1_250) % 10_000,
            };
            let received_at = now - Duration::days((lots - lot) as i64 * 2);
            db.batches()
                .create(
                    &NewBatch {
                        product_id: product.id.clone(),
                        quantity,
                        shelf_life_days: *shelf_life,
                        received_at,
                    },
                    true,
                )
                .await?;
            batches += 1;
        }

        products.push(product);
    }

    println!("✓ {} products, {} batches", products.len(), batches);

    // One promotion of each kind
    println!();
    println!("Generating promotions...");

    let by_sku = |sku: &str| -> String {
        products
            .iter()
            .find(|p| p.sku == sku)
            .map(|p| p.id.clone())
            .unwrap_or_default()
    };

    let promotions = vec![
        promotion(
            "FRESH10",
            "10% off fresh produce",
            PromotionKind::ProductDiscount {
                scope: DiscountScope::WeighedOnly,
                value: DiscountValue::Percent(RateBps::from_percent(10)),
            },
            Some(Money::new(25_000)),
        ),
        promotion(
            "PASTANIGHT",
            "Pasta + sauce for 29,000",
            PromotionKind::Bundle {
                product_ids: vec![by_sku("PAN-PST-500"), by_sku("PAN-SAU-TOM")],
                pricing: BundlePricing::FixedPrice(Money::new(29_000)),
            },
            None,
        ),
        promotion(
            "YOGB1G1",
            "Greek yogurt buy 1 get 1",
            PromotionKind::BuyXGetY(BuyXGetYRule::SameProduct {
                product_id: by_sku("DRY-YOG-150"),
                buy: 1,
                get: 1,
            }),
            None,
        ),
        promotion(
            "BREADBUTTER",
            "Buy 2 bread, butter free",
            PromotionKind::BuyXGetY(BuyXGetYRule::DifferentProducts {
                buy_product_id: by_sku("BAK-BRD-WHT"),
                buy: 2,
                get_product_id: by_sku("DRY-BUT-200"),
                get: 1,
            }),
            None,
        ),
    ];

    for promo in &promotions {
        db.promotions().insert(promo).await?;
        println!("  {} ({})", promo.code, promo.kind.kind_str());
    }

    // Loyalty accounts
    println!();
    println!("Generating loyalty accounts...");

    let program = LoyaltyProgram::default();
    for (name, balance) in ACCOUNTS {
        let account = db.loyalty().create(name, *balance, &program).await?;
        println!(
            "  {} - {} pts ({}) id={}",
            account.customer_name, account.point_balance, account.tier, account.id
        );
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds a catalogue product. Cost is 70% of the selling price.
fn generate_product(
    sku: &str,
    name: &str,
    category: &str,
    unit_type: UnitType,
    price: i64,
) -> Product {
    let now = Utc::now();

    Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        cost_price: Money::new(price * 70 / 100),
        sell_price: Money::new(price),
        unit_type,
        current_stock: 0,
        expiry_notification_days: if unit_type == UnitType::Weighed { 2 } else { 3 },
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn promotion(
    code: &str,
    name: &str,
    kind: PromotionKind,
    max_discount: Option<Money>,
) -> Promotion {
    Promotion {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        name: name.to_string(),
        kind,
        min_quantity: None,
        max_discount,
        starts_at: Utc::now() - Duration::days(1),
        ends_at: Some(Utc::now() + Duration::days(30)),
        status: PromotionStatus::Active,
    }
}
