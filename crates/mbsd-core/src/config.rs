//! # Configuration
//!
//! YAML configuration for hosts running the detector:
//!
//! - Detector timing (startup settling delay, nominal sample rate, tick rate)
//! - The sensitivity table of programmable activity parameters
//! - Which sensitivity setting to apply at construction
//! - Logging
//!
//! ## Sensitivity settings
//!
//! Setting index `0` means "no setting applied": the built-in defaults are
//! used and the detector never escalates past `Idle`. Index `k` in
//! `1..=settings.len()` selects `settings[k - 1]`. No threshold has a
//! clinical default; every value comes from the integrating system.
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `MBSD_CONFIG` environment variable
//! 2. `./mbsd.yaml` (current directory)
//! 3. `~/.config/mbsd/config.yaml` (user config)
//! 4. `/etc/mbsd/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! detector:
//!   startup_delay_ticks: 3000
//!   sample_rate_hz: 50
//!
//! sensitivity:
//!   settings:
//!     - stda_low: 40
//!       stda_high: 120
//!       activity_ticks: 10000
//!       period_low: 10
//!       period_high: 60
//!       ratio_high_q12: 1024
//!       min_peaks: 4
//!       peak_hysteresis: 8
//!
//! active_setting: 1
//! ```

use crate::observe::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "MBSD_CONFIG";

/// Error type for configuration operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file or entry not found
    #[error("config not found: {0}")]
    NotFound(String),
    /// Failed to read or write a configuration file
    #[error("failed to read config: {0}")]
    ReadError(String),
    /// Failed to parse or serialise configuration
    #[error("failed to parse config: {0}")]
    ParseError(String),
    /// Invalid configuration value
    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Detector timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Settling period after start-up or restart, in ticks
    pub startup_delay_ticks: u32,
    /// Nominal accelerometer sample rate
    pub sample_rate_hz: u32,
    /// Timestamp ticks per second
    pub ticks_per_second: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            startup_delay_ticks: crate::detector::STARTUP_DELAY_TICKS,
            sample_rate_hz: 50,
            ticks_per_second: 1000,
        }
    }
}

impl DetectorConfig {
    /// Nominal timestamp step between samples.
    pub fn ticks_per_sample(&self) -> u32 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        self.ticks_per_second / self.sample_rate_hz
    }
}

/// Programmable activity parameters for one sensitivity setting.
///
/// Activity levels are in raw-count units of the summed per-axis mean
/// absolute deviation. Periods are in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityParams {
    /// Activity below this drops back to `Idle`
    pub stda_low: i32,
    /// Activity at or above this escalates from `Idle` to `Active`
    pub stda_high: i32,
    /// Minimum time in `Active` before a rhythm can be declared, in ticks
    pub activity_ticks: u32,
    /// Shortest accepted mean peak-peak period
    pub period_low: i16,
    /// Longest accepted mean peak-peak period
    pub period_high: i16,
    /// Largest accepted deviation/period ratio, Q12
    pub ratio_high_q12: i16,
    /// Confirmed peaks required before a rhythm can be declared
    pub min_peaks: u16,
    /// Minimum amplitude between opposite extrema for a peak to be confirmed
    pub peak_hysteresis: i16,
}

impl Default for ActivityParams {
    /// Built-in defaults: escalation disabled.
    fn default() -> Self {
        Self {
            stda_low: 0,
            stda_high: i32::MAX,
            activity_ticks: u32::MAX,
            period_low: 0,
            period_high: i16::MAX,
            ratio_high_q12: i16::MAX,
            min_peaks: u16::MAX,
            peak_hysteresis: 0,
        }
    }
}

impl ActivityParams {
    /// Check internal consistency of the thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stda_low > self.stda_high {
            return Err(ConfigError::ValidationError(format!(
                "stda_low ({}) must not exceed stda_high ({})",
                self.stda_low, self.stda_high
            )));
        }
        if self.period_low > self.period_high {
            return Err(ConfigError::ValidationError(format!(
                "period_low ({}) must not exceed period_high ({})",
                self.period_low, self.period_high
            )));
        }
        if self.ratio_high_q12 < 0 || self.peak_hysteresis < 0 {
            return Err(ConfigError::ValidationError(
                "ratio_high_q12 and peak_hysteresis must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Table of selectable sensitivity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityTable {
    /// Settings, selected by 1-based index
    pub settings: Vec<ActivityParams>,
}

impl SensitivityTable {
    /// Create a table from settings in index order.
    pub fn new(settings: Vec<ActivityParams>) -> Self {
        Self { settings }
    }

    /// Parameters for setting `index`; `None` for `0` or past the end.
    pub fn get(&self, index: u8) -> Option<&ActivityParams> {
        match index {
            0 => None,
            k => self.settings.get(k as usize - 1),
        }
    }

    /// Number of selectable settings.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Whether the table holds no settings.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

/// Complete detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MbsdConfig {
    /// Configuration version
    pub version: String,
    /// Detector timing
    pub detector: DetectorConfig,
    /// Sensitivity table
    pub sensitivity: SensitivityTable,
    /// Setting applied at construction, `0` for built-in defaults
    pub active_setting: u8,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for MbsdConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            detector: DetectorConfig::default(),
            sensitivity: SensitivityTable::default(),
            active_setting: 0,
            logging: LogConfig::default(),
        }
    }
}

impl MbsdConfig {
    /// Load configuration from the default search path.
    ///
    /// Search order:
    /// 1. `MBSD_CONFIG` environment variable
    /// 2. `./mbsd.yaml`
    /// 3. `~/.config/mbsd/config.yaml`
    /// 4. `/etc/mbsd/config.yaml`
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
            return Err(ConfigError::NotFound(format!(
                "{} points to {}",
                CONFIG_ENV,
                path.display()
            )));
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./mbsd.yaml")];

        if let Some(dirs) = directories::ProjectDirs::from("", "", "mbsd") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/mbsd/config.yaml"));
        paths
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.startup_delay_ticks == 0 {
            return Err(ConfigError::ValidationError(
                "startup_delay_ticks must be > 0".to_string(),
            ));
        }

        if self.detector.sample_rate_hz == 0 {
            return Err(ConfigError::ValidationError(
                "sample_rate_hz must be > 0".to_string(),
            ));
        }

        for (i, params) in self.sensitivity.settings.iter().enumerate() {
            params.validate().map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("setting {}: {}", i + 1, msg))
                }
                other => other,
            })?;
        }

        if self.active_setting as usize > self.sensitivity.len() {
            return Err(ConfigError::ValidationError(format!(
                "active_setting {} out of range (table has {})",
                self.active_setting,
                self.sensitivity.len()
            )));
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let config = Self {
            sensitivity: SensitivityTable::new(vec![
                ActivityParams {
                    stda_low: 40,
                    stda_high: 120,
                    activity_ticks: 10_000,
                    period_low: 10,
                    period_high: 60,
                    ratio_high_q12: 1024,
                    min_peaks: 4,
                    peak_hysteresis: 8,
                },
                ActivityParams {
                    stda_low: 80,
                    stda_high: 240,
                    activity_ticks: 20_000,
                    period_low: 8,
                    period_high: 50,
                    ratio_high_q12: 768,
                    min_peaks: 6,
                    peak_hysteresis: 16,
                },
            ]),
            active_setting: 1,
            ..Default::default()
        };

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MbsdConfig::default();
        assert_eq!(config.detector.startup_delay_ticks, 3000);
        assert_eq!(config.detector.ticks_per_sample(), 20);
        assert_eq!(config.active_setting, 0);
        assert!(config.sensitivity.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
detector:
  startup_delay_ticks: 1500
  sample_rate_hz: 100

sensitivity:
  settings:
    - stda_low: 10
      stda_high: 50
      activity_ticks: 4000
      min_peaks: 2

active_setting: 1

logging:
  level: debug
"#;

        let config = MbsdConfig::parse(yaml).unwrap();
        assert_eq!(config.detector.startup_delay_ticks, 1500);
        assert_eq!(config.detector.sample_rate_hz, 100);
        assert_eq!(config.detector.ticks_per_second, 1000);
        assert_eq!(config.active_setting, 1);

        let params = config.sensitivity.get(1).unwrap();
        assert_eq!(params.stda_high, 50);
        assert_eq!(params.min_peaks, 2);
        // Unset fields fall back to the disabled defaults.
        assert_eq!(params.period_high, i16::MAX);
        assert_eq!(config.logging.level, crate::observe::LogLevel::Debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_table_indexing() {
        let table = SensitivityTable::new(vec![ActivityParams::default(); 2]);
        assert!(table.get(0).is_none());
        assert!(table.get(1).is_some());
        assert!(table.get(2).is_some());
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = MbsdConfig::default();
        config.detector.startup_delay_ticks = 0;
        assert!(config.validate().is_err());

        let mut config = MbsdConfig::default();
        config.active_setting = 1;
        assert!(config.validate().is_err());

        config.sensitivity.settings.push(ActivityParams {
            stda_low: 100,
            stda_high: 50,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("setting 1"), "{}", err);

        config.sensitivity.settings[0].stda_high = 200;
        assert!(config.validate().is_ok());

        config.sensitivity.settings[0].period_low = 90;
        config.sensitivity.settings[0].period_high = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_yaml() {
        let yaml = MbsdConfig::example_yaml();
        assert!(yaml.contains("detector:"));
        assert!(yaml.contains("sensitivity:"));
        let parsed = MbsdConfig::parse(&yaml).unwrap();
        assert_eq!(parsed.sensitivity.len(), 2);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mbsd.yaml");

        let config = MbsdConfig::parse(&MbsdConfig::example_yaml()).unwrap();
        config.save(&path).unwrap();

        let loaded = MbsdConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "active_setting: 3\n").unwrap();
        assert!(matches!(
            MbsdConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "detector: [1, 2").unwrap();
        assert!(matches!(
            MbsdConfig::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            MbsdConfig::load_from(&dir.path().join("missing.yaml")),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn test_config_search_paths() {
        let paths = MbsdConfig::config_search_paths();
        assert!(paths[0].ends_with("mbsd.yaml"));
        assert!(paths.last().unwrap().ends_with("config.yaml"));
    }
}
