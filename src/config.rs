use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::{LedgerRules, DEFAULT_MAX_UPDATE_ATTEMPTS};
use crate::domain::{FarmingRules, FixedUnitPrice, LinearYield, Units};

/// Name of the configuration file looked up in the working directory
/// (any extension the `config` crate understands, e.g. `stocksback.yaml`).
pub const DEFAULT_CONFIG_NAME: &str = "stocksback";

/// Prefix of environment overrides, e.g. `STOCKSBACK__SECURITY__SALT`.
pub const ENV_PREFIX: &str = "STOCKSBACK";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub farming: FarmingSettings,
    pub stocks: StockSettings,
    pub security: SecuritySettings,
    pub service: ServiceSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "stocksback.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FarmingSettings {
    pub min_interval_secs: u64,
    pub max_credit_secs: u64,
    pub units_per_minute: Units,
}

impl Default for FarmingSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 60,
            max_credit_secs: 24 * 60 * 60,
            units_per_minute: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StockSettings {
    pub unit_price: Units,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self { unit_price: 10 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub salt: String,
    pub admin_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub operation_timeout_ms: u64,
    pub max_update_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5_000,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file (explicit, or `stocksback.*` in the
    /// working directory if present) and then from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        settings = match path {
            Some(path) => settings.add_source(config::File::from(path).required(true)),
            None => settings.add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.salt.is_empty() {
            bail!("security.salt must be set");
        }
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.service.operation_timeout_ms == 0 {
            bail!("service.operation_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    /// SQLite URL for the configured path; `create` allows creating the file.
    pub fn database_url(&self, create: bool) -> String {
        if create {
            format!("sqlite:{}?mode=rwc", self.database.path)
        } else {
            format!("sqlite:{}", self.database.path)
        }
    }

    pub fn farming_rules(&self) -> FarmingRules {
        FarmingRules::new(
            secs(self.farming.min_interval_secs),
            secs(self.farming.max_credit_secs),
        )
    }

    pub fn ledger_rules(&self) -> LedgerRules {
        LedgerRules::new(self.security.salt.clone())
            .with_farming(self.farming_rules())
            .with_operation_timeout(Duration::from_millis(self.service.operation_timeout_ms))
            .with_max_update_attempts(self.service.max_update_attempts)
    }

    pub fn yield_policy(&self) -> LinearYield {
        LinearYield::new(self.farming.units_per_minute)
    }

    pub fn price_policy(&self) -> FixedUnitPrice {
        FixedUnitPrice::new(self.stocks.unit_price)
    }

    /// Whether `key` matches the administrative key. An unset key never matches.
    pub fn is_admin_key(&self, key: &str) -> bool {
        !self.security.admin_key.is_empty() && self.security.admin_key == key
    }
}

fn secs(value: u64) -> chrono::Duration {
    // chrono durations top out at i64::MAX milliseconds.
    let capped = value.min((i64::MAX / 1_000) as u64);
    chrono::Duration::seconds(capped as i64)
}
