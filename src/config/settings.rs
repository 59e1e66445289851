use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::LedgerError;
use crate::subscription::YearBounds;

static SCHEMA_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid schema regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub accounting: AccountingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
    /// When set, subscriptions live in Postgres instead of the SQLite file.
    pub pg_url: Option<String>,
    pub pg_schema: Option<String>,
    pub pg_pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/subledger.db".to_string(),
            pg_url: None,
            pg_schema: None,
            pg_pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    pub min_year: u16,
    pub max_year: u16,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub store_timeout_ms: u64,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            min_year: 2000,
            max_year: 2100,
            default_page_size: 20,
            max_page_size: 100,
            store_timeout_ms: 5_000,
        }
    }
}

impl AccountingConfig {
    pub fn year_bounds(&self) -> YearBounds {
        YearBounds {
            min: self.min_year,
            max: self.max_year,
        }
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Reads the first config file found, applies `SUBLEDGER_*` environment
    /// overrides and validates the result. Missing files yield defaults.
    pub fn load() -> Result<Self, LedgerError> {
        let mut settings = match Self::find_config_file() {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let settings = Self::from_toml(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                settings
            }
            None => {
                tracing::warn!("No custom-config.toml or config.toml found, using defaults");
                Settings::default()
            }
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, LedgerError> {
        toml::from_str(content).map_err(|e| LedgerError::Config(format!("invalid config: {}", e)))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SUBLEDGER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SUBLEDGER_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid SUBLEDGER_PORT '{}'", port),
            }
        }
        if let Some(path) = lookup("SUBLEDGER_DATABASE_PATH") {
            self.storage.database_path = path;
        }
        if let Some(url) = lookup("SUBLEDGER_PG_URL").filter(|s| !s.trim().is_empty()) {
            self.storage.pg_url = Some(url);
        }
        if let Some(schema) = lookup("SUBLEDGER_PG_SCHEMA").filter(|s| !s.trim().is_empty()) {
            self.storage.pg_schema = Some(schema);
        }
        if let Some(level) = lookup("SUBLEDGER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        let a = &self.accounting;
        if a.min_year > a.max_year {
            return Err(LedgerError::Config(format!(
                "accounting.min_year ({}) is greater than accounting.max_year ({})",
                a.min_year, a.max_year
            )));
        }
        if a.default_page_size == 0 || a.max_page_size == 0 {
            return Err(LedgerError::Config("page sizes must be positive".into()));
        }
        if a.default_page_size > a.max_page_size {
            return Err(LedgerError::Config(format!(
                "accounting.default_page_size ({}) exceeds accounting.max_page_size ({})",
                a.default_page_size, a.max_page_size
            )));
        }
        if a.store_timeout_ms == 0 {
            return Err(LedgerError::Config("accounting.store_timeout_ms must be positive".into()));
        }
        if let Some(schema) = &self.storage.pg_schema {
            if !SCHEMA_NAME_RE.is_match(schema) {
                return Err(LedgerError::Config(format!(
                    "storage.pg_schema '{}' is not a plain identifier",
                    schema
                )));
            }
        }
        Ok(())
    }

    fn find_config_file() -> Option<&'static str> {
        let possible_names = ["custom-config.toml", "config.toml"];
        possible_names.into_iter().find(|name| Path::new(name).exists())
    }
}
