//! # larder-engine: Order Fulfillment Engine
//!
//! Takes a cart from the till and turns it into a committed order: lines
//! priced, promotion and points applied, stock drawn from the oldest batches,
//! everything written in one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Larder POS                                     │
//! │                                                                         │
//! │   Till / UI                                                             │
//! │      │  CreateOrderRequest            ▲  OrderResult                    │
//! │      ▼                                │                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 larder-engine (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   OrderEngine ─────────────┐    InventoryService               │   │
//! │  │   Draft → Priced →         │    restock / adjust_out           │   │
//! │  │   Allocated → Persisted →  │    batch_report / expiring_soon   │   │
//! │  │   Committed                │                                    │   │
//! │  │                            │    EngineConfig (larder.toml)      │   │
//! │  └────────────┬───────────────┴───────────────┬────────────────────┘   │
//! │               │ pure rules                    │ one transaction        │
//! │               ▼                               ▼                        │
//! │  ┌────────────────────────┐      ┌────────────────────────────────┐    │
//! │  │      larder-core       │      │           larder-db            │    │
//! │  │  pricing, promotions,  │      │  repositories, guarded FIFO,   │    │
//! │  │  loyalty, FIFO plans   │      │  order numbers, migrations     │    │
//! │  └────────────────────────┘      └────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`order`] - The orchestrator and its request/result types
//! - [`inventory`] - Restocks, write-offs and expiry reports
//! - [`config`] - Layered engine configuration
//! - [`error`] - Order failures and the serialisable result
//! - [`telemetry`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use larder_engine::{telemetry, EngineConfig, OrderEngine};
//! use larder_db::Database;
//! use tokio_util::sync::CancellationToken;
//!
//! telemetry::init_tracing();
//!
//! let config = EngineConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let engine = OrderEngine::new(db, config);
//!
//! let result = engine.submit_order(&request, &CancellationToken::new()).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod inventory;
pub mod order;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use error::{
    EngineResult, Failure, FailureCode, NotEligibleError, OrderError, OrderResult,
    PostCommitWarning,
};
pub use inventory::{InventoryError, InventoryService};
pub use order::{
    CreateOrderRequest, CreatedOrder, OrderDetail, OrderEngine, OrderLineRequest, PaymentRequest,
};
