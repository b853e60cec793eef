//! # Ledger Configuration
//!
//! Loaded from `NAUTILUS_*` environment variables, with defaults suitable
//! for a single-shop install.
//!
//! | Variable                   | Default         | Meaning                         |
//! |----------------------------|-----------------|---------------------------------|
//! | `NAUTILUS_DB_PATH`         | `./nautilus.db` | SQLite file                     |
//! | `NAUTILUS_TAX_RATE`        | `8.00`          | Sales tax, percent              |
//! | `NAUTILUS_MAX_CONNECTIONS` | `5`             | Pool size                       |
//! | `NAUTILUS_OUTBOX_BATCH`    | `50`            | Events per redelivery pass      |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use nautilus_core::validation::validate_tax_rate_bps;
use nautilus_core::TaxRate;
use nautilus_db::DbConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub database_path: PathBuf,

    /// Sales tax applied to taxable lines.
    pub tax_rate: TaxRate,

    pub max_connections: u32,

    /// How many undelivered outbox events one redelivery pass picks up.
    pub outbox_batch_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("./nautilus.db"),
            tax_rate: TaxRate::from_bps(800),
            max_connections: 5,
            outbox_batch_size: 50,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = LedgerConfig::default();

        if let Some(path) = lookup("NAUTILUS_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(rate) = lookup("NAUTILUS_TAX_RATE") {
            let pct: f64 = rate
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("NAUTILUS_TAX_RATE".to_string()))?;
            if !pct.is_finite() || pct < 0.0 {
                return Err(ConfigError::InvalidValue("NAUTILUS_TAX_RATE".to_string()));
            }
            let tax_rate = TaxRate::from_percentage(pct);
            validate_tax_rate_bps(tax_rate.bps())
                .map_err(|_| ConfigError::InvalidValue("NAUTILUS_TAX_RATE".to_string()))?;
            config.tax_rate = tax_rate;
        }

        if let Some(max) = lookup("NAUTILUS_MAX_CONNECTIONS") {
            config.max_connections = parse_positive(&max, "NAUTILUS_MAX_CONNECTIONS")?;
        }

        if let Some(batch) = lookup("NAUTILUS_OUTBOX_BATCH") {
            config.outbox_batch_size = parse_positive(&batch, "NAUTILUS_OUTBOX_BATCH")?;
        }

        Ok(config)
    }

    pub fn with_tax_rate(mut self, tax_rate: TaxRate) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    /// Pool settings for [`nautilus_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone()).max_connections(self.max_connections)
    }
}

fn parse_positive(value: &str, key: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.tax_rate.bps(), 800);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.outbox_batch_size, 50);
        assert_eq!(config.database_path, PathBuf::from("./nautilus.db"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("NAUTILUS_DB_PATH", "/var/lib/nautilus/shop.db"),
            ("NAUTILUS_TAX_RATE", "8.25"),
            ("NAUTILUS_MAX_CONNECTIONS", "8"),
        ])
        .unwrap();

        assert_eq!(config.tax_rate.bps(), 825);
        assert_eq!(config.db_config().max_connections, 8);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/nautilus/shop.db"));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("NAUTILUS_TAX_RATE", "eight"),
            ("NAUTILUS_TAX_RATE", "-1"),
            ("NAUTILUS_TAX_RATE", "150"),
            ("NAUTILUS_MAX_CONNECTIONS", "0"),
            ("NAUTILUS_OUTBOX_BATCH", "lots"),
        ] {
            let err = load(&[(key, value)]).unwrap_err();
            assert_eq!(err.to_string(), format!("Invalid value for {}", key));
        }
    }
}
