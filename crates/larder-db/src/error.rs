//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OrderError (larder-engine) ← Names product / amount for the cashier   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use larder_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting duplicate SKU
    /// - Duplicate order number or promotion code
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. a batch remainder leaving its bounds).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    /// Remaining batch stock cannot cover a FIFO allocation.
    ///
    /// ## When This Occurs
    /// - Σ remaining < requested when the allocation is planned
    /// - A guarded decrement found the batch already drained
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// A row was rejected before it reached SQLite.
    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    /// A status change the order lifecycle does not allow.
    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored JSON column could not be read or written.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Units short, for `InsufficientStock`.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            DbError::InsufficientStock {
                requested,
                available,
                ..
            } => Some(requested - available),
            _ => None,
        }
    }
}

/// Maps sqlx failures onto the categories callers branch on.
///
/// ```text
/// RowNotFound                        → NotFound
/// "UNIQUE constraint failed: t.col"  → UniqueViolation { field: "col" }
/// "FOREIGN KEY constraint failed"    → ForeignKeyViolation
/// "CHECK constraint failed: expr"    → CheckViolation
/// PoolTimedOut                       → PoolExhausted
/// PoolClosed                         → ConnectionFailed
/// anything else                      → QueryFailed / Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => classify_constraint(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

/// Reads SQLite's constraint message. The value behind a UNIQUE failure is
/// not in the message, so repositories that know it re-wrap with
/// [`DbError::duplicate`].
fn classify_constraint(message: &str) -> DbError {
    if let Some(target) = message.strip_prefix("UNIQUE constraint failed: ") {
        // "orders.order_number" or "t.a, t.b" for composite indexes
        let field = target
            .split(", ")
            .map(|col| col.rsplit('.').next().unwrap_or(col))
            .collect::<Vec<_>>()
            .join(", ");
        return DbError::duplicate(field, "unknown");
    }
    if message.starts_with("FOREIGN KEY constraint failed") {
        return DbError::ForeignKeyViolation {
            message: message.to_string(),
        };
    }
    if message.starts_with("CHECK constraint failed") {
        return DbError::CheckViolation {
            message: message.to_string(),
        };
    }
    DbError::QueryFailed(message.to_string())
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Ledger planning failures surface as database errors on the FIFO path.
impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => DbError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            CoreError::ProductNotFound(id) => DbError::not_found("Product", id),
            CoreError::OrderNotFound(id) => DbError::not_found("Order", id),
            CoreError::InvalidStatusTransition { order_id, from, to } => {
                DbError::InvalidTransition(format!("order {} from {} to {}", order_id, from, to))
            }
            CoreError::Validation(e) => DbError::Validation(e),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
