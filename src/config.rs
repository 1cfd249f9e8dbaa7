//! Venue configuration loaded from a YAML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main venue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub broker: BrokerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub listen_addr: String,
    pub tickers: Vec<String>,
    pub interval_secs: u64,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    pub base_inventory: i32,
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

impl ExchangeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub listen_addr: String,
    pub exchange_addr: String,
    pub broker_id: i64,
    pub db: DbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
}

fn default_db_port() -> u16 {
    5432
}

impl DbConfig {
    /// Connection string. The password may be overridden with the
    /// VENUE_DB_PASSWORD environment variable so it can stay out of YAML.
    pub fn dsn(&self) -> String {
        let password =
            std::env::var("VENUE_DB_PASSWORD").unwrap_or_else(|_| self.password.clone());

        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, password, self.host, self.port, self.db_name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub broker_addr: String,
    pub login: String,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let config: Config = serde_yaml::from_str(&yaml_content)?;

        config.validate()?;

        Ok(config)
    }

    /// Config path from the first CLI argument, then the VENUE_CONFIG
    /// environment variable, then `configs/default.yaml`.
    pub fn path_from_args() -> String {
        std::env::args()
            .nth(1)
            .or_else(|| std::env::var("VENUE_CONFIG").ok())
            .unwrap_or_else(|| "configs/default.yaml".to_string())
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.exchange.tickers.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one ticker must be configured".to_string(),
            ));
        }

        if self.exchange.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.exchange.base_inventory < 0 {
            return Err(ConfigError::ValidationError(
                "base_inventory must not be negative".to_string(),
            ));
        }

        if self.broker.broker_id <= 0 {
            return Err(ConfigError::ValidationError(
                "broker_id must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
