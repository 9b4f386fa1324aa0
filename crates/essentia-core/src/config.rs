//! Configuration for a grid essentia cache.
//!
//! Values can be built in code or loaded from a TOML file:
//!
//! ```toml
//! conversion_ratio = 250
//! power_per_essentia = 0.3
//! tick_interval_ms = 50
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::convert::UnitConverter;
use crate::error::ConfigError;

/// Power charged per essentia moved when nothing else is configured.
pub const DEFAULT_POWER_PER_ESSENTIA: f64 = 0.3;

/// Default interval between periodic ticks (one game tick).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a [`GridEssentiaCache`](crate::GridEssentiaCache).
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    /// Native store units per essentia.
    pub conversion_ratio: u32,
    /// Power charged per essentia transferred.
    pub power_per_essentia: f64,
    /// Interval between periodic ticks.
    pub tick_interval: Duration,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            conversion_ratio: UnitConverter::DEFAULT_RATIO,
            power_per_essentia: DEFAULT_POWER_PER_ESSENTIA,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// On-disk shape of [`GridConfig`]; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GridConfigFile {
    conversion_ratio: Option<u32>,
    power_per_essentia: Option<f64>,
    tick_interval_ms: Option<u64>,
}

impl GridConfig {
    /// Set the conversion ratio.
    #[must_use]
    pub fn with_conversion_ratio(mut self, ratio: u32) -> Self {
        self.conversion_ratio = ratio;
        self
    }

    /// Set the power charged per essentia.
    #[must_use]
    pub fn with_power_per_essentia(mut self, rate: f64) -> Self {
        self.power_per_essentia = rate;
        self
    }

    /// Set the tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero ratio, a non-positive or
    /// non-finite power rate, or a zero tick interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversion_ratio == 0 {
            return Err(ConfigError::Invalid(
                "conversion_ratio must be >= 1".to_string(),
            ));
        }
        if !self.power_per_essentia.is_finite() || self.power_per_essentia <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "power_per_essentia must be a positive number, got {}",
                self.power_per_essentia
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the unit converter for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the ratio is zero.
    pub fn converter(&self) -> Result<UnitConverter, ConfigError> {
        UnitConverter::new(self.conversion_ratio)
    }

    /// Parse a TOML document, filling missing keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: GridConfigFile = toml::from_str(input)?;
        let defaults = Self::default();
        let config = Self {
            conversion_ratio: file.conversion_ratio.unwrap_or(defaults.conversion_ratio),
            power_per_essentia: file
                .power_per_essentia
                .unwrap_or(defaults.power_per_essentia),
            tick_interval: file
                .tick_interval_ms
                .map_or(defaults.tick_interval, Duration::from_millis),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`GridConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
