//! # Engine Configuration
//!
//! Configuration management for the order engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LARDER_ORDER_PREFIX=TILL2                                          │
//! │     LARDER_POINT_VALUE=1000                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/larder/larder.toml (Linux)                               │
//! │     ~/Library/Application Support/com.larder.pos/larder.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     prefix "ORD", 1 point = 1,000, tiers bronze..platinum              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # larder.toml
//! [store]
//! name = "Larder Kemang"
//! order_prefix = "KMG"
//!
//! [loyalty]
//! point_value = 1000
//! min_redemption_points = 10
//! min_transaction_for_points = 10000
//! tiers = [
//!     { name = "bronze", min_points = 0 },
//!     { name = "silver", min_points = 500 },
//! ]
//!
//! [inventory]
//! default_notification_days = 3
//! merge_same_day_restock = true
//!
//! [database]
//! path = "/var/lib/larder/larder.db"
//! max_connections = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use larder_core::{LoyaltyProgram, Money, Tier, DEFAULT_EXPIRY_NOTIFICATION_DAYS};
use larder_db::DbConfig;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available on this platform")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Store Configuration
// =============================================================================

/// The store this engine sells for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Human-readable store name.
    #[serde(default = "default_store_name")]
    pub name: String,

    /// First part of every order number: `<prefix>-YYYYMMDD-NNNN`.
    #[serde(default = "default_order_prefix")]
    pub order_prefix: String,
}

fn default_store_name() -> String {
    "Larder".to_string()
}

fn default_order_prefix() -> String {
    "ORD".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            name: default_store_name(),
            order_prefix: default_order_prefix(),
        }
    }
}

// =============================================================================
// Loyalty Configuration
// =============================================================================

/// Loyalty programme parameters. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyConfig {
    /// Value of one point.
    #[serde(default = "default_point_value")]
    pub point_value: i64,

    /// Smallest non-zero redemption accepted.
    #[serde(default = "default_min_redemption")]
    pub min_redemption_points: i64,

    /// Order total that earns one point.
    #[serde(default = "default_min_transaction")]
    pub min_transaction_for_points: i64,

    /// Tier thresholds. Order in the file does not matter.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<Tier>,
}

fn default_point_value() -> i64 {
    LoyaltyProgram::default().point_value.amount()
}

fn default_min_redemption() -> i64 {
    LoyaltyProgram::default().min_redemption_points
}

fn default_min_transaction() -> i64 {
    LoyaltyProgram::default().min_transaction_for_points.amount()
}

fn default_tiers() -> Vec<Tier> {
    LoyaltyProgram::default().tiers
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        LoyaltyConfig {
            point_value: default_point_value(),
            min_redemption_points: default_min_redemption(),
            min_transaction_for_points: default_min_transaction(),
            tiers: default_tiers(),
        }
    }
}

impl LoyaltyConfig {
    /// Builds the programme the core rules run against.
    pub fn program(&self) -> LoyaltyProgram {
        LoyaltyProgram::new(
            Money::new(self.point_value),
            self.min_redemption_points,
            Money::new(self.min_transaction_for_points),
            self.tiers.clone(),
        )
    }
}

// =============================================================================
// Inventory Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Threshold used for new products that do not set their own.
    #[serde(default = "default_notification_days")]
    pub default_notification_days: i64,

    /// Fold same-day restocks of one product and shelf life into one batch.
    #[serde(default = "default_true")]
    pub merge_same_day_restock: bool,
}

fn default_notification_days() -> i64 {
    DEFAULT_EXPIRY_NOTIFICATION_DAYS
}

fn default_true() -> bool {
    true
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            default_notification_days: default_notification_days(),
            merge_same_day_restock: default_true(),
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub loyalty: LoyaltyConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (larder.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let prefix = self.store.order_prefix.trim();
        if prefix.is_empty() || prefix.len() > 8 {
            return Err(ConfigError::Invalid(
                "store.order_prefix must be 1 to 8 characters".into(),
            ));
        }
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid(format!(
                "store.order_prefix must be alphanumeric, got '{}'",
                prefix
            )));
        }

        if self.loyalty.point_value <= 0 {
            return Err(ConfigError::Invalid(
                "loyalty.point_value must be greater than 0".into(),
            ));
        }
        if self.loyalty.min_redemption_points < 0 {
            return Err(ConfigError::Invalid(
                "loyalty.min_redemption_points must not be negative".into(),
            ));
        }
        if self.loyalty.min_transaction_for_points <= 0 {
            return Err(ConfigError::Invalid(
                "loyalty.min_transaction_for_points must be greater than 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for tier in &self.loyalty.tiers {
            if tier.name.trim().is_empty() {
                return Err(ConfigError::Invalid("loyalty tier names must not be empty".into()));
            }
            if tier.min_points < 0 {
                return Err(ConfigError::Invalid(format!(
                    "loyalty tier '{}' has a negative threshold",
                    tier.name
                )));
            }
            if !seen.insert(tier.min_points) {
                return Err(ConfigError::Invalid(format!(
                    "two loyalty tiers share the threshold {}",
                    tier.min_points
                )));
            }
        }

        if self.inventory.default_notification_days < 0 {
            return Err(ConfigError::Invalid(
                "inventory.default_notification_days must not be negative".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("LARDER_STORE_NAME") {
            self.store.name = name;
        }

        if let Ok(prefix) = std::env::var("LARDER_ORDER_PREFIX") {
            debug!(prefix = %prefix, "Overriding order prefix from environment");
            self.store.order_prefix = prefix;
        }

        if let Ok(value) = std::env::var("LARDER_POINT_VALUE") {
            match value.parse::<i64>() {
                Ok(v) => self.loyalty.point_value = v,
                Err(_) => warn!(value = %value, "Ignoring non-numeric LARDER_POINT_VALUE"),
            }
        }

        if let Ok(value) = std::env::var("LARDER_MIN_REDEMPTION_POINTS") {
            if let Ok(v) = value.parse::<i64>() {
                self.loyalty.min_redemption_points = v;
            }
        }

        if let Ok(value) = std::env::var("LARDER_MIN_TRANSACTION_FOR_POINTS") {
            if let Ok(v) = value.parse::<i64>() {
                self.loyalty.min_transaction_for_points = v;
            }
        }

        if let Ok(value) = std::env::var("LARDER_NOTIFICATION_DAYS") {
            if let Ok(v) = value.parse::<i64>() {
                self.inventory.default_notification_days = v;
            }
        }

        if let Ok(value) = std::env::var("LARDER_MERGE_SAME_DAY_RESTOCK") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.inventory.merge_same_day_restock = true,
                "0" | "false" | "no" => self.inventory.merge_same_day_restock = false,
                _ => warn!(value = %value, "Unknown LARDER_MERGE_SAME_DAY_RESTOCK value"),
            }
        }

        if let Ok(path) = std::env::var("LARDER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(value) = std::env::var("LARDER_DB_MAX_CONNECTIONS") {
            if let Ok(v) = value.parse::<u32>() {
                self.database.max_connections = v;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("larder.toml"))
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "larder", "pos")
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Order-number prefix, trimmed.
    pub fn order_prefix(&self) -> &str {
        self.store.order_prefix.trim()
    }

    /// Database file: the configured path, else `larder.db` in the platform
    /// data directory, else the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("larder.db"))
                .unwrap_or_else(|| PathBuf::from("larder.db"))
        })
    }

    /// Pool settings for [`larder_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path()).max_connections(self.database.max_connections)
    }
}
