//! # Configuration Management Module
//!
//! TOML configuration for the guild economy, loaded once at startup.
//!
//! ## Configuration Structure
//!
//! - [`EconomyConfig`] - currency name, cooldowns, grants, page sizes, store timeout
//! - [`StorageConfig`] - where the sled database lives
//! - [`LoggingConfig`] - log level and optional log file
//!
//! Every field has a default, so a partial file (or an empty one) is valid.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use guildmarket::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Currency: {}", config.economy.currency_name);
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rules of the economy itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EconomyConfig {
    /// Plural noun used in every message, e.g. "coins"
    #[serde(default = "default_currency_name")]
    pub currency_name: String,
    /// Minimum seconds between two item uses by one player
    #[serde(default = "default_use_cooldown_secs")]
    pub use_cooldown_secs: u64,
    /// Player ids exempt from the use cooldown (administrators)
    #[serde(default)]
    pub cooldown_bypass: Vec<u64>,
    /// Upper bound on any single store call
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_shop_page_size")]
    pub shop_page_size: usize,
    #[serde(default = "default_inventory_page_size")]
    pub inventory_page_size: usize,
    #[serde(default = "default_daily_grant")]
    pub daily_grant: i64,
    #[serde(default = "default_daily_cooldown_hours")]
    pub daily_cooldown_hours: u64,
    #[serde(default = "default_beg_min")]
    pub beg_min: i64,
    #[serde(default = "default_beg_max")]
    pub beg_max: i64,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
}

fn default_currency_name() -> String {
    "coins".to_string()
}
fn default_use_cooldown_secs() -> u64 {
    60
}
fn default_store_timeout_secs() -> u64 {
    10
}
fn default_shop_page_size() -> usize {
    5
}
fn default_inventory_page_size() -> usize {
    10
}
fn default_daily_grant() -> i64 {
    100
}
fn default_daily_cooldown_hours() -> u64 {
    24
}
fn default_beg_min() -> i64 {
    1
}
fn default_beg_max() -> i64 {
    10
}
fn default_leaderboard_size() -> usize {
    10
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            currency_name: default_currency_name(),
            use_cooldown_secs: default_use_cooldown_secs(),
            cooldown_bypass: Vec::new(),
            store_timeout_secs: default_store_timeout_secs(),
            shop_page_size: default_shop_page_size(),
            inventory_page_size: default_inventory_page_size(),
            daily_grant: default_daily_grant(),
            daily_cooldown_hours: default_daily_cooldown_hours(),
            beg_min: default_beg_min(),
            beg_max: default_beg_max(),
            leaderboard_size: default_leaderboard_size(),
        }
    }
}

impl EconomyConfig {
    pub fn use_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.use_cooldown_secs.min(i64::MAX as u64) as i64)
    }

    pub fn daily_cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.daily_cooldown_hours.min(i32::MAX as u64) as i64)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn bypasses_cooldown(&self, player_id: u64) -> bool {
        self.cooldown_bypass.contains(&player_id)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.currency_name.trim().is_empty() {
            return Err(anyhow!("economy.currency_name must not be empty"));
        }
        if self.store_timeout_secs == 0 {
            return Err(anyhow!("economy.store_timeout_secs must be at least 1"));
        }
        if self.shop_page_size == 0 || self.inventory_page_size == 0 {
            return Err(anyhow!("economy page sizes must be at least 1"));
        }
        if self.leaderboard_size == 0 {
            return Err(anyhow!("economy.leaderboard_size must be at least 1"));
        }
        if self.daily_grant < 0 {
            return Err(anyhow!("economy.daily_grant must not be negative"));
        }
        if self.beg_min < 0 || self.beg_min > self.beg_max {
            return Err(anyhow!(
                "economy.beg_min ({}) must be between 0 and beg_max ({})",
                self.beg_min,
                self.beg_max
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Explicit database directory; `<data_dir>/economy` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: None,
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_dir).join("economy"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.economy.validate()
    }
}
