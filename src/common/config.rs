//! Configuration file handling

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Post-destroy absence checks
    #[serde(default)]
    pub destroy: DestroyConfig,

    /// Simulated cloud settings
    #[serde(default)]
    pub sim: SimConfig,

    /// Scenario execution settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Destroy verification settings
///
/// The default is a single fetch per identifier. Raising `max_attempts`
/// turns the check into bounded polling for eventually-consistent remotes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DestroyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts, only used when `max_attempts > 1`
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for DestroyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl DestroyConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_max_attempts() -> u32 {
    1
}
fn default_interval_ms() -> u64 {
    500
}

/// Simulated cloud configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimConfig {
    /// Number of reads that still observe a group after it was deleted
    #[serde(default)]
    pub read_lag: u32,

    /// Whether new groups are created with the default rule set
    #[serde(default = "default_true")]
    pub default_rules: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            read_lag: 0,
            default_rules: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Scenario execution configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunConfig {
    /// Run independent scenario files concurrently
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.destroy.max_attempts == 0 {
            return Err(Error::Config(
                "destroy.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
