//! Configuration management for the satellite allocator.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Ledger and reconciliation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Currency bucket values are reported in.
    pub base_currency: String,
    /// Largest absolute drift reconciliation corrects without an operator.
    pub auto_correct_threshold: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: "EUR".to_string(),
            auto_correct_threshold: Decimal::new(5, 0),
        }
    }
}

/// Raw win-cooldown and reawakening tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub cooldown_trigger_pct: f64,
    pub cooldown_days: i64,
    pub cooldown_aggression_reduction: f64,
    pub cooldown_lookback_days: i64,
    pub reawakening_stages: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            cooldown_trigger_pct: 0.20,
            cooldown_days: 30,
            cooldown_aggression_reduction: 0.25,
            cooldown_lookback_days: 30,
            reawakening_stages: 4,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let ledger_defaults = LedgerConfig::default();
        let risk_defaults = RiskConfig::default();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| Error::Config {
                    message: "DATABASE_URL environment variable not set".to_string(),
                })?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", default_max_connections()),
            },
            ledger: LedgerConfig {
                base_currency: env::var("BASE_CURRENCY").unwrap_or(ledger_defaults.base_currency),
                auto_correct_threshold: env_or(
                    "RECONCILE_AUTO_CORRECT_THRESHOLD",
                    ledger_defaults.auto_correct_threshold,
                ),
            },
            risk: RiskConfig {
                cooldown_trigger_pct: env_or(
                    "RISK_COOLDOWN_TRIGGER_PCT",
                    risk_defaults.cooldown_trigger_pct,
                ),
                cooldown_days: env_or("RISK_COOLDOWN_DAYS", risk_defaults.cooldown_days),
                cooldown_aggression_reduction: env_or(
                    "RISK_COOLDOWN_AGGRESSION_REDUCTION",
                    risk_defaults.cooldown_aggression_reduction,
                ),
                cooldown_lookback_days: env_or(
                    "RISK_COOLDOWN_LOOKBACK_DAYS",
                    risk_defaults.cooldown_lookback_days,
                ),
                reawakening_stages: env_or(
                    "RISK_REAWAKENING_STAGES",
                    risk_defaults.reawakening_stages,
                ),
            },
        })
    }

    /// Load configuration from an optional file layered under
    /// `SATELLITE__*` environment variables (e.g. `SATELLITE__DATABASE__URL`).
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SATELLITE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the ledger or risk throttles meaningless.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.ledger.auto_correct_threshold < Decimal::ZERO {
            return Err(Error::Config {
                message: "auto_correct_threshold must not be negative".to_string(),
            });
        }
        if self.risk.reawakening_stages == 0 {
            return Err(Error::Config {
                message: "reawakening_stages must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.risk.cooldown_aggression_reduction) {
            return Err(Error::Config {
                message: "cooldown_aggression_reduction must be within [0, 1]".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration for testing (with defaults).
    pub fn test_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/satellites_test".to_string(),
                max_connections: 2,
            },
            ledger: LedgerConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger.auto_correct_threshold, Decimal::new(5, 0));
        assert_eq!(config.ledger.base_currency, "EUR");
        assert_eq!(config.risk.cooldown_days, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::test_config();
        config.risk.reawakening_stages = 0;
        assert!(config.validate().is_err());

        let mut config = Config::test_config();
        config.ledger.auto_correct_threshold = Decimal::new(-1, 0);
        assert!(config.validate().is_err());

        let mut config = Config::test_config();
        config.risk.cooldown_aggression_reduction = 1.5;
        assert!(config.validate().is_err());
    }
}
