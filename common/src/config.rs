// Configuration management with layered configuration (file, env)

use crate::allocator::{MinuteSelection, DEFAULT_MAX_DAY_STEPS};
use crate::errors::OptimizerError;
use crate::models::{parse_timezone, ScheduleConstraints, StrategyKind, TimeRange};
use crate::quality::{DEFAULT_REOPTIMIZE_THRESHOLD, DEFAULT_SCALE_FACTOR};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub optimizer: OptimizerConfig,
    pub constraints: ConstraintsConfig,
    pub quality: QualityConfig,
    pub io: IoConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub strategy: StrategyKind,
    pub lookback_days: u32,
    pub analytics_timeout_ms: u64,
    pub max_day_steps: u32,
    pub minute_selection: MinuteSelection,
}

impl OptimizerConfig {
    pub fn analytics_timeout(&self) -> Duration {
        Duration::from_millis(self.analytics_timeout_ms)
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::SlotSearch,
            lookback_days: 30,
            analytics_timeout_ms: 5_000,
            max_day_steps: DEFAULT_MAX_DAY_STEPS,
            minute_selection: MinuteSelection::Random,
        }
    }
}

/// Default constraints as they appear in configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintsConfig {
    pub max_items_per_day: u32,
    pub min_interval_minutes: u32,
    pub preferred_time_ranges: Vec<TimeRange>,
    pub timezone: String,
}

impl ConstraintsConfig {
    /// Resolve the timezone and check value ranges
    pub fn to_constraints(&self) -> Result<ScheduleConstraints, OptimizerError> {
        let constraints = ScheduleConstraints {
            max_items_per_day: self.max_items_per_day,
            min_interval_minutes: self.min_interval_minutes,
            preferred_time_ranges: self.preferred_time_ranges.clone(),
            timezone: parse_timezone(&self.timezone)?,
        };
        constraints.validate()?;
        Ok(constraints)
    }
}

impl Default for ConstraintsConfig {
    fn default() -> Self {
        let defaults = ScheduleConstraints::default();
        Self {
            max_items_per_day: defaults.max_items_per_day,
            min_interval_minutes: defaults.min_interval_minutes,
            preferred_time_ranges: defaults.preferred_time_ranges,
            timezone: defaults.timezone.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub scale_factor: f64,
    pub reoptimize_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            reoptimize_threshold: DEFAULT_REOPTIMIZE_THRESHOLD,
        }
    }
}

/// File locations used by the host binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub items_path: String,
    pub analytics_path: String,
    pub output_path: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            items_path: "data/pending_items.json".to_string(),
            analytics_path: "data/analytics.json".to_string(),
            output_path: "data/schedule.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        self.constraints
            .to_constraints()
            .map_err(|e| e.to_string())?;

        if self.optimizer.lookback_days == 0 {
            return Err("Optimizer lookback_days must be greater than 0".to_string());
        }
        if self.optimizer.analytics_timeout_ms == 0 {
            return Err("Optimizer analytics_timeout_ms must be greater than 0".to_string());
        }
        if self.optimizer.max_day_steps == 0 {
            return Err("Optimizer max_day_steps must be greater than 0".to_string());
        }
        if let MinuteSelection::Fixed { minute } = self.optimizer.minute_selection {
            if minute > 59 {
                return Err("Fixed minute_selection must be between 0 and 59".to_string());
            }
        }

        if !(self.quality.scale_factor > 0.0) {
            return Err("Quality scale_factor must be greater than 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.quality.reoptimize_threshold) {
            return Err("Quality reoptimize_threshold must be between 0 and 100".to_string());
        }

        if self.io.items_path.is_empty() || self.io.output_path.is_empty() {
            return Err("IO items_path and output_path cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_bad_timezone() {
        let mut settings = Settings::default();
        settings.constraints.timezone = "Atlantis/Capital".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.contains("Atlantis/Capital"));
    }

    #[test]
    fn test_validation_catches_empty_ranges() {
        let mut settings = Settings::default();
        settings.constraints.preferred_time_ranges.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_scale_factor() {
        let mut settings = Settings::default();
        settings.quality.scale_factor = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_out_of_range_fixed_minute() {
        let mut settings = Settings::default();
        settings.optimizer.minute_selection = MinuteSelection::Fixed { minute: 75 };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[optimizer]
strategy = "ranked_hours"
lookback_days = 14
minute_selection = { mode = "seeded", seed = 42 }

[constraints]
max_items_per_day = 4
min_interval_minutes = 90
timezone = "Asia/Ho_Chi_Minh"
preferred_time_ranges = [
    { start = "08:00", end = "11:00" },
    { start = "22:00", end = "01:00" },
]
"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.optimizer.strategy, StrategyKind::RankedHours);
        assert_eq!(settings.optimizer.lookback_days, 14);
        assert_eq!(settings.optimizer.minute_selection, MinuteSelection::Seeded { seed: 42 });
        // Unset keys keep their defaults
        assert_eq!(settings.optimizer.analytics_timeout_ms, 5_000);

        let constraints = settings.constraints.to_constraints().unwrap();
        assert_eq!(constraints.max_items_per_day, 4);
        assert_eq!(constraints.timezone, chrono_tz::Asia::Ho_Chi_Minh);
        assert!(constraints.preferred_time_ranges[1].wraps_midnight());
    }
}
