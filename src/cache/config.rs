//! Cache Configuration
//!
//! Plain structs with defaults. Hosts may build them in code or load them
//! from a YAML document.

use serde::{Deserialize, Serialize};

use super::key::IDENTITY_SEPARATOR;
use super::{DEFAULT_FLC_PREFIX, DEFAULT_PREFIX, DEFAULT_SWEEP_THRESHOLD};
use crate::error::{Error, Result};

/// Weak store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeakCacheConfig {
    /// Prefix prepended to every raw key
    pub prefix: String,
    /// Minimum writes between automatic sweeps; the interval grows to the
    /// store's size after each sweep (0 disables automatic sweeping)
    pub sweep_threshold: u64,
}

impl Default for WeakCacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }
}

impl WeakCacheConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would break key enumeration
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

/// First-level cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstLevelCacheConfig {
    /// Prefix prepended to every identity key
    pub prefix: String,
    /// Minimum writes between automatic sweeps; the interval grows to the
    /// store's size after each sweep (0 disables automatic sweeping)
    pub sweep_threshold: u64,
}

impl Default for FirstLevelCacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_FLC_PREFIX.to_string(),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }
}

impl FirstLevelCacheConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The identity separator may not appear in the prefix
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("prefix must not be empty".to_string()));
        }
        if self.prefix.contains(IDENTITY_SEPARATOR) {
            return Err(Error::Config(format!(
                "prefix {:?} must not contain '{}'",
                self.prefix, IDENTITY_SEPARATOR
            )));
        }
        Ok(())
    }

    pub(crate) fn store_config(&self) -> WeakCacheConfig {
        WeakCacheConfig {
            prefix: self.prefix.clone(),
            sweep_threshold: self.sweep_threshold,
        }
    }
}
