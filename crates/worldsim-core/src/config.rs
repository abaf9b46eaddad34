//! Configuration loading and typed config structures for worldsim.
//!
//! The configuration lives in `worldsim-config.yaml` at the project root.
//! This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file.
//! Every field has a default, so an empty file (or no file at all) yields
//! a runnable configuration.

use std::path::Path;

use serde::Deserialize;

use crate::clock::{DEFAULT_SEED, HOURS_PER_DAY};
use crate::tick::FailurePolicy;

/// Environment variable that overrides `world.seed`.
pub const SEED_ENV_VAR: &str = "WORLDSIM_SEED";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (name, seed).
    #[serde(default)]
    pub world: WorldConfig,

    /// Clock start position, run length, pacing and regions.
    #[serde(default)]
    pub time: TimeConfig,

    /// Subscriber dispatch behavior.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `WORLDSIM_SEED` environment variable overrides `world.seed`
    /// when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_seed_override(std::env::var(SEED_ENV_VAR).ok().as_deref())?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty map.
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace `world.seed` with an override value, if one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the value is not a `u64`.
    pub fn apply_seed_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = value {
            self.world.seed = raw.trim().parse().map_err(|_err| ConfigError::Invalid {
                reason: format!("{SEED_ENV_VAR} must be an unsigned integer, got {raw:?}"),
            })?;
        }
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time.validate()
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for every derived random stream in the run.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
        }
    }
}

/// Clock and run-length configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeConfig {
    /// Day the clock starts on.
    #[serde(default)]
    pub start_day: u64,

    /// Hour the clock starts on (0-23).
    #[serde(default)]
    pub start_hour: u8,

    /// Number of in-game hours the engine runs (0 = until stopped).
    #[serde(default = "default_run_hours")]
    pub run_hours: u64,

    /// Real-time milliseconds to wait between hours (0 = as fast as possible).
    #[serde(default)]
    pub tick_interval_ms: u64,

    /// Regional clocks to create at startup.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

impl TimeConfig {
    /// Validate the start position and region names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `start_hour` is above 23 or two
    /// regions share a name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_hour >= HOURS_PER_DAY {
            return Err(ConfigError::Invalid {
                reason: format!("time.start_hour must be within 0..=23, got {}", self.start_hour),
            });
        }
        for (i, region) in self.regions.iter().enumerate() {
            if self.regions.iter().skip(i.saturating_add(1)).any(|r| r.name == region.name) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate region name: {}", region.name),
                });
            }
        }
        Ok(())
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_day: 0,
            start_hour: 0,
            run_hours: default_run_hours(),
            tick_interval_ms: 0,
            regions: Vec::new(),
        }
    }
}

/// One regional clock.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionConfig {
    /// Region name, unique within the run.
    pub name: String,

    /// Hour offset from the world clock (east positive, west negative).
    #[serde(default)]
    pub offset_hours: i32,
}

/// Subscriber dispatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// What happens when a subscriber callback fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Untold Realm".to_owned()
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

const fn default_run_hours() -> u64 {
    48
}

fn default_log_level() -> String {
    "info".to_owned()
}
