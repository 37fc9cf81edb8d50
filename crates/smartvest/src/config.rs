//! Configuration management for smartvest.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "smartvest";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "smartvest.db";

/// Name of the key-value slot holding the record list.
pub const DEFAULT_SLOT_KEY: &str = "smartvest_users";

/// Largest accepted profile photo (2 MiB).
pub const DEFAULT_MAX_PHOTO_BYTES: u64 = 2 * 1024 * 1024;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SMARTVEST_`, `__` between sections)
/// 2. TOML config file at `~/.config/smartvest/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Registration configuration.
    pub registration: RegistrationConfig,
    /// Telemetry simulation configuration.
    pub telemetry: TelemetryConfig,
    /// Address verification configuration.
    pub address: AddressConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/smartvest/smartvest.db`
    pub database_path: Option<PathBuf>,
    /// Key of the slot that holds the serialized record list.
    pub slot_key: String,
    /// Directory receiving CSV and JSON exports.
    /// Defaults to `~/.local/share/smartvest/exports`
    pub export_dir: Option<PathBuf>,
}

/// Registration-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Maximum photo size in bytes.
    pub max_photo_bytes: u64,
    /// bcrypt cost used when hashing passwords.
    pub password_cost: u32,
    /// Base URL that portable and local profile links point at.
    pub link_base_url: String,
}

/// Simulated telemetry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Device id of the initial state.
    pub device_id: String,
    /// Initial latitude.
    pub latitude: f64,
    /// Initial longitude.
    pub longitude: f64,
    /// Initial battery level (0-100).
    pub battery_level: u8,
    /// Full width of the random position jitter, in degrees.
    pub move_amount: f64,
    /// Delay between simulated updates in milliseconds.
    pub tick_ms: u64,
}

/// Address verification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    /// API key for the text-generation service. Verification is skipped when unset.
    pub api_key: Option<String>,
    /// Base endpoint of the service.
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            slot_key: DEFAULT_SLOT_KEY.to_string(),
            export_dir: None,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
            password_cost: bcrypt::DEFAULT_COST,
            link_base_url: "https://smartvest.app/profile".to_string(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        // Quito, Ecuador
        Self {
            device_id: "VEST-DEMO".to_string(),
            latitude: -0.180_653,
            longitude: -78.467_834,
            battery_level: 85,
            move_amount: 0.001,
            tick_ms: 1000,
        }
    }
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("SMARTVEST_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.slot_key.trim().is_empty() {
            return Err(invalid("slot_key must not be empty"));
        }

        if self.registration.max_photo_bytes == 0 {
            return Err(invalid("max_photo_bytes must be greater than 0"));
        }

        if !(4..=31).contains(&self.registration.password_cost) {
            return Err(invalid(format!(
                "password_cost ({}) must be between 4 and 31",
                self.registration.password_cost
            )));
        }

        if self.registration.link_base_url.trim().is_empty() {
            return Err(invalid("link_base_url must not be empty"));
        }

        let t = &self.telemetry;
        if !(-90.0..=90.0).contains(&t.latitude) || !(-180.0..=180.0).contains(&t.longitude) {
            return Err(invalid(format!(
                "telemetry position ({}, {}) is out of range",
                t.latitude, t.longitude
            )));
        }

        if t.battery_level > 100 {
            return Err(invalid(format!(
                "battery_level ({}) cannot exceed 100",
                t.battery_level
            )));
        }

        if t.move_amount.is_nan() || t.move_amount <= 0.0 {
            return Err(invalid("move_amount must be greater than 0"));
        }

        if t.tick_ms == 0 {
            return Err(invalid("tick_ms must be greater than 0"));
        }

        if self.address.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be greater than 0"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export directory, resolving defaults if not set.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.storage
            .export_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("exports"))
    }

    /// Get the telemetry tick as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.tick_ms)
    }

    /// Get the address service timeout as a Duration.
    #[must_use]
    pub fn address_timeout(&self) -> Duration {
        Duration::from_secs(self.address.timeout_secs)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
