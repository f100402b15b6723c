//! # Repository Module
//!
//! Database repository implementations for Larder POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Pool-level repositories (one statement or their own transaction)      │
//! │       db.products().get_by_sku("YOGURT-150")                           │
//! │       db.batches().list_for_product(&product_id)                       │
//! │       db.loyalty().settle(&account_id, ...)                            │
//! │                                                                         │
//! │  Connection-level functions (join the caller's transaction)            │
//! │       let mut tx = db.begin().await?;                                  │
//! │       order::next_order_number(&mut *tx, "ORD", now)                   │
//! │       batch::allocate_fifo(&mut *tx, &product_id, 750)                 │
//! │       order::insert_order(&mut *tx, &order)                            │
//! │       tx.commit().await?;                                              │
//! │                                                                         │
//! │  SQL stays in this module either way.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalogue reads and maintenance
//! - [`batch::BatchRepository`] - Restocks, FIFO allocation, expiry reports
//! - [`order::OrderRepository`] - Committed orders and their trail
//! - [`promotion::PromotionRepository`] - Promotion catalogue
//! - [`loyalty::LoyaltyRepository`] - Point balances and tiers

pub mod batch;
pub mod loyalty;
pub mod order;
pub mod product;
pub mod promotion;
