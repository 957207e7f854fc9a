//! Configuration for the scheduler and its tick driver.

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on interval firings per task per tick.
    ///
    /// `None` (the default) fires every owed interval, however many. With a
    /// cap, owed time beyond the cap is kept and drained on later ticks.
    pub max_catch_up_firings: Option<u32>,
    /// Pre-allocated task slots.
    pub initial_capacity: usize,
    /// Settings for [`TickDriver`](crate::driver::TickDriver).
    pub driver: DriverConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_catch_up_firings: None,
            initial_capacity: 64,
            driver: DriverConfig::default(),
        }
    }
}

/// Tick driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Ticks per second.
    pub tick_rate_hz: u32,
    /// Multiplier applied to real elapsed time to produce the scaled delta.
    ///
    /// `1.0` is real time, `0.0` freezes scaled time (unscaled tasks keep
    /// running).
    pub time_scale: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            time_scale: 1.0,
        }
    }
}

impl DriverConfig {
    /// Validates driver settings.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 {
            return Err(SchedulerError::Config(
                "driver.tick_rate_hz must be greater than 0".into(),
            ));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(SchedulerError::Config(
                "driver.time_scale must be a finite, non-negative number".into(),
            ));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_catch_up_firings`, when set, must be greater than 0
    /// - the driver section (see [`DriverConfig::validate`])
    pub fn validate(&self) -> Result<()> {
        if self.max_catch_up_firings == Some(0) {
            return Err(SchedulerError::Config(
                "max_catch_up_firings must be greater than 0 when set".into(),
            ));
        }
        self.driver.validate()
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::from_file(path) {
            Ok(config) => Ok(config),
            Err(SchedulerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SchedulerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path:
    /// `$XDG_CONFIG_HOME/frame-scheduler/config.toml`, else
    /// `~/.config/frame-scheduler/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config)
                .join("frame-scheduler")
                .join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("frame-scheduler")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/frame-scheduler/config.toml")
        }
    }
}
