//! # Telemetry
//!
//! Tracing subscriber setup for binaries and tests that embed the engine.
//!
//! ```text
//! RUST_LOG set?  ──yes──►  EnvFilter from RUST_LOG
//!      │
//!      no
//!      ▼
//! "info,larder=debug,sqlx=warn"
//! ```

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is absent.
pub const DEFAULT_FILTER: &str = "info,larder=debug,sqlx=warn";

/// Installs a fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return `false`.
pub fn init_tracing() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
