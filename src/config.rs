//! Configuration file support
//!
//! Settings live in `config.toml` under the platform config directory
//! (`~/.config/holdings/config.toml` on Linux) or wherever `HOLDINGS_CONFIG`
//! points. Every field has a default, so a missing file is not an error.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LedgerError;

fn default_up_threshold() -> Decimal {
    Decimal::new(25, 1)
}

fn default_down_threshold() -> Decimal {
    Decimal::new(50, 1)
}

/// Percentage moves beyond which a balance change is treated as a capital flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A rise above this percentage of the previous balance is a contribution.
    pub up_threshold_percent: Decimal,

    /// A fall larger than this percentage of the previous balance is a withdrawal.
    pub down_threshold_percent: Decimal,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            up_threshold_percent: default_up_threshold(),
            down_threshold_percent: default_down_threshold(),
        }
    }
}

impl Thresholds {
    pub fn new(up_threshold_percent: Decimal, down_threshold_percent: Decimal) -> Self {
        Self {
            up_threshold_percent,
            down_threshold_percent,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.up_threshold_percent.is_sign_negative() {
            return Err(LedgerError::ConfigError(format!(
                "up_threshold_percent must be >= 0 (got {})",
                self.up_threshold_percent
            )));
        }
        if self.down_threshold_percent.is_sign_negative() {
            return Err(LedgerError::ConfigError(format!(
                "down_threshold_percent must be >= 0 (got {})",
                self.down_threshold_percent
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file; `~/.holdings/data.db` when unset.
    pub database_path: Option<PathBuf>,

    /// Thresholds for the delta-threshold reconstruction policy.
    pub classification: Thresholds,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.classification.validate()?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Resolve the config file location: `HOLDINGS_CONFIG`, then the platform config dir
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HOLDINGS_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dir_spec::config_home().map(|dir| dir.join("holdings").join("config.toml"))
}
