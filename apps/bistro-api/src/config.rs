//! # Server Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     BISTRO_PORT=9090                                                    │
//! │     BISTRO_DB_PATH=/var/lib/bistro/bistro.db                            │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/bistro-pos/bistro.toml (Linux)                            │
//! │     ~/Library/Application Support/com.bistro.pos/bistro.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "/var/lib/bistro/bistro.db"
//! max_connections = 5
//!
//! [store]
//! name = "Bistro Colombo 07"
//! address = "12 Flower Road, Colombo 07"
//! language = "si"
//!
//! [payments]
//! card_session_ttl_minutes = 15
//! card_decline_all = false
//!
//! [sync]
//! duplicate_window_minutes = 10
//!
//! [stock]
//! enforce_on_sale = false
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use bistro_core::conflict::ConflictConfig;
use bistro_core::i18n::Language;
use bistro_core::payment::{CARD_SESSION_TTL_MINUTES, WALLET_SESSION_TTL_MINUTES};
use bistro_core::receipt::{StoreInfo, DEFAULT_RECEIPT_WIDTH, MAX_RECEIPT_WIDTH, MIN_RECEIPT_WIDTH};

/// Longest a card or wallet session may stay open.
pub const MAX_SESSION_TTL_MINUTES: i64 = 24 * 60;

/// Widest duplicate-sale window.
pub const MAX_DUPLICATE_WINDOW_MINUTES: i64 = 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: 5,
        }
    }
}

/// Receipt header and language.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub footer: Option<String>,
    /// Default receipt language code (`en`, `si`, `ta`).
    pub language: String,
    pub receipt_width: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            name: "Bistro".to_string(),
            address: None,
            phone: None,
            footer: None,
            language: "en".to_string(),
            receipt_width: DEFAULT_RECEIPT_WIDTH,
        }
    }
}

impl StoreSettings {
    pub fn language(&self) -> Language {
        Language::from_code(&self.language)
    }

    /// Receipt header. The VAT number comes from the active VAT settings.
    pub fn store_info(&self, vat_registration: Option<String>) -> StoreInfo {
        StoreInfo {
            name: self.name.clone(),
            address: self.address.clone(),
            phone: self.phone.clone(),
            vat_registration,
            footer: self.footer.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub card_session_ttl_minutes: i64,
    pub wallet_session_ttl_minutes: i64,
    /// Simulated card gateway declines every charge.
    pub card_decline_all: bool,
    /// Simulated wallet provider rejects every approval.
    pub wallet_decline_all: bool,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        PaymentSettings {
            card_session_ttl_minutes: CARD_SESSION_TTL_MINUTES,
            wallet_session_ttl_minutes: WALLET_SESSION_TTL_MINUTES,
            card_decline_all: false,
            wallet_decline_all: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub duplicate_window_minutes: i64,
    pub duplicate_threshold: f64,
    pub possible_duplicate_threshold: f64,
    pub name_similarity_threshold: f64,
    /// Largest offline batch accepted in one upload.
    pub max_batch_records: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let c = ConflictConfig::default();
        SyncSettings {
            duplicate_window_minutes: c.duplicate_window_minutes,
            duplicate_threshold: c.duplicate_threshold,
            possible_duplicate_threshold: c.possible_duplicate_threshold,
            name_similarity_threshold: c.name_similarity_threshold,
            max_batch_records: 500,
        }
    }
}

impl SyncSettings {
    pub fn conflict_config(&self) -> ConflictConfig {
        ConflictConfig {
            duplicate_window_minutes: self.duplicate_window_minutes,
            duplicate_threshold: self.duplicate_threshold,
            possible_duplicate_threshold: self.possible_duplicate_threshold,
            name_similarity_threshold: self.name_similarity_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockSettings {
    /// Reject sales whose recipes need more than the location holds.
    pub enforce_on_sale: bool,
    /// Location sales consume from. Defaults to the first kitchen.
    pub consumption_location_id: Option<String>,
}

// =============================================================================
// ApiConfig
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub payments: PaymentSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub stock: StockSettings,
}

impl ApiConfig {
    /// Loads configuration from defaults, the TOML file and the environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bistro.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.store.name.trim().is_empty() {
            return Err(ConfigError::Invalid("store.name must not be empty".into()));
        }
        if !(MIN_RECEIPT_WIDTH..=MAX_RECEIPT_WIDTH).contains(&self.store.receipt_width) {
            return Err(ConfigError::Invalid(format!(
                "store.receipt_width must be between {MIN_RECEIPT_WIDTH} and {MAX_RECEIPT_WIDTH}"
            )));
        }
        let ttls = [
            self.payments.card_session_ttl_minutes,
            self.payments.wallet_session_ttl_minutes,
        ];
        if ttls.iter().any(|t| !(1..=MAX_SESSION_TTL_MINUTES).contains(t)) {
            return Err(ConfigError::Invalid(format!(
                "session TTLs must be between 1 and {MAX_SESSION_TTL_MINUTES} minutes"
            )));
        }
        if !(1..=MAX_DUPLICATE_WINDOW_MINUTES).contains(&self.sync.duplicate_window_minutes) {
            return Err(ConfigError::Invalid(format!(
                "sync.duplicate_window_minutes must be between 1 and {MAX_DUPLICATE_WINDOW_MINUTES}"
            )));
        }
        let thresholds = [
            self.sync.duplicate_threshold,
            self.sync.possible_duplicate_threshold,
            self.sync.name_similarity_threshold,
        ];
        if thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(ConfigError::Invalid(
                "sync thresholds must be between 0 and 1".into(),
            ));
        }
        if self.sync.possible_duplicate_threshold > self.sync.duplicate_threshold {
            return Err(ConfigError::Invalid(
                "possible_duplicate_threshold must not exceed duplicate_threshold".into(),
            ));
        }
        if self.sync.max_batch_records == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_batch_records must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies `BISTRO_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("BISTRO_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = lookup("BISTRO_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(value = %port, "Ignoring invalid BISTRO_PORT"),
            }
        }

        if let Some(path) = lookup("BISTRO_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("BISTRO_STORE_NAME") {
            self.store.name = name;
        }

        if let Some(lang) = lookup("BISTRO_LANGUAGE") {
            self.store.language = lang;
        }

        if let Some(flag) = lookup("BISTRO_CARD_DECLINE_ALL") {
            self.payments.card_decline_all = parse_flag(&flag);
        }

        if let Some(flag) = lookup("BISTRO_WALLET_DECLINE_ALL") {
            self.payments.wallet_decline_all = parse_flag(&flag);
        }

        if let Some(flag) = lookup("BISTRO_ENFORCE_STOCK") {
            self.stock.enforce_on_sale = parse_flag(&flag);
        }

        if let Some(minutes) = lookup("BISTRO_DUPLICATE_WINDOW_MINUTES") {
            match minutes.parse::<i64>() {
                Ok(m) => self.sync.duplicate_window_minutes = m,
                Err(_) => warn!(value = %minutes, "Ignoring invalid BISTRO_DUPLICATE_WINDOW_MINUTES"),
            }
        }
    }

    /// Database file: configured path, else `bistro.db` in the data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "bistro", "pos").ok_or_else(|| {
            ConfigError::Invalid("could not determine the app data directory".into())
        })?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join("bistro.db"))
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bistro", "pos")
            .map(|dirs| dirs.config_dir().join("bistro.toml"))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.sync.duplicate_window_minutes, 10);
        assert!(!config.stock.enforce_on_sale);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ApiConfig = toml::from_str(
            r#"
            [store]
            name = "Bistro Galle Fort"
            language = "ta"

            [payments]
            card_decline_all = true
            "#,
        )
        .unwrap();

        assert_eq!(config.store.name, "Bistro Galle Fort");
        assert_eq!(config.store.language(), Language::Ta);
        assert_eq!(config.store.receipt_width, DEFAULT_RECEIPT_WIDTH);
        assert!(config.payments.card_decline_all);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BISTRO_PORT", "9090"),
            ("BISTRO_DB_PATH", "/tmp/bistro.db"),
            ("BISTRO_CARD_DECLINE_ALL", "yes"),
            ("BISTRO_ENFORCE_STOCK", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = ApiConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/bistro.db")));
        assert!(config.payments.card_decline_all);
        assert!(config.stock.enforce_on_sale);
    }

    #[test]
    fn test_invalid_port_override_ignored() {
        let mut config = ApiConfig::default();
        config.apply_overrides(|k| (k == "BISTRO_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validation() {
        let mut config = ApiConfig::default();
        config.store.receipt_width = 10;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.sync.possible_duplicate_threshold = 0.95;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upper_bounds() {
        let mut config = ApiConfig::default();
        config.store.receipt_width = MAX_RECEIPT_WIDTH + 1;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.payments.card_session_ttl_minutes = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.payments.wallet_session_ttl_minutes = MAX_SESSION_TTL_MINUTES + 1;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.sync.duplicate_window_minutes = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.payments.card_session_ttl_minutes = MAX_SESSION_TTL_MINUTES;
        config.sync.duplicate_window_minutes = MAX_DUPLICATE_WINDOW_MINUTES;
        config.store.receipt_width = MAX_RECEIPT_WIDTH;
        assert!(config.validate().is_ok());
    }
}
