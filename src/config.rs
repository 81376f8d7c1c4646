//! Harness configuration using Figment
//!
//! Configuration is layered (lowest to highest precedence):
//! 1. Built-in defaults (protocol constants: 1000 ms async threshold, 500 ms poll interval)
//! 2. A TOML file, when one is given
//! 3. Environment variables prefixed with `CONFORM_`, nested keys separated by `__`
//!
//! ```text
//! CONFORM_APPLICATION__LOG_LEVEL=debug
//! CONFORM_PHASES__PERFORMANCE=true
//! CONFORM_ROTATOR__MOVE_TIMEOUT_SECS=120
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rust_conform::config::ConformConfig;
//! use rust_conform::hardware::DeviceCategory;
//!
//! fn main() -> rust_conform::error::AppResult<()> {
//!     let config = ConformConfig::load_from("config/conform.toml")?;
//!     let settings = config.settings_for(DeviceCategory::Rotator);
//!     println!("Rotator move timeout: {:?}", settings.operation_timeout);
//!     Ok(())
//! }
//! ```

use crate::conformance::{ToleranceBand, DEFAULT_ASYNC_THRESHOLD};
use crate::error::{AppResult, ConformError};
use crate::hardware::DeviceCategory;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConformConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub phases: PhaseConfig,
    #[serde(default)]
    pub rotator: RotatorConfig,
    #[serde(default)]
    pub focuser: FocuserConfig,
    #[serde(default)]
    pub cover_calibrator: CoverCalibratorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rust_conform".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Timing shared by all categories unless a category overrides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Commands returning after more than this are treated as synchronous.
    #[serde(default = "default_async_threshold_ms")]
    pub async_threshold_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            async_threshold_ms: default_async_threshold_ms(),
        }
    }
}

/// Which optional phases run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default = "default_true")]
    pub methods: bool,
    #[serde(default)]
    pub performance: bool,
    #[serde(default = "default_performance_window_secs")]
    pub performance_window_secs: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            methods: true,
            performance: false,
            performance_window_secs: default_performance_window_secs(),
        }
    }
}

/// Rotator test parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatorConfig {
    #[serde(default = "default_move_timeout_secs")]
    pub move_timeout_secs: u64,
    #[serde(default)]
    pub async_threshold_ms: Option<u64>,
    /// Degrees
    #[serde(default = "default_rotator_tolerance")]
    pub position_tolerance: ToleranceBand,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            move_timeout_secs: default_move_timeout_secs(),
            async_threshold_ms: None,
            position_tolerance: default_rotator_tolerance(),
        }
    }
}

/// Focuser test parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocuserConfig {
    #[serde(default = "default_move_timeout_secs")]
    pub move_timeout_secs: u64,
    #[serde(default)]
    pub async_threshold_ms: Option<u64>,
    /// Steps
    #[serde(default = "default_focuser_tolerance")]
    pub position_tolerance: ToleranceBand,
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            move_timeout_secs: default_move_timeout_secs(),
            async_threshold_ms: None,
            position_tolerance: default_focuser_tolerance(),
        }
    }
}

/// CoverCalibrator test parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverCalibratorConfig {
    #[serde(default = "default_move_timeout_secs")]
    pub cover_timeout_secs: u64,
    #[serde(default = "default_move_timeout_secs")]
    pub calibrator_timeout_secs: u64,
    #[serde(default)]
    pub async_threshold_ms: Option<u64>,
}

impl Default for CoverCalibratorConfig {
    fn default() -> Self {
        Self {
            cover_timeout_secs: default_move_timeout_secs(),
            calibrator_timeout_secs: default_move_timeout_secs(),
            async_threshold_ms: None,
        }
    }
}

/// Everything one sequencer run needs, flattened from [`ConformConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySettings {
    pub category: DeviceCategory,
    pub async_threshold: Duration,
    pub poll_interval: Duration,
    /// Bound on a motion (rotator, focuser) or cover operation.
    pub operation_timeout: Duration,
    /// Bound on calibrator warm-up; equals `operation_timeout` for other categories.
    pub calibrator_timeout: Duration,
    pub tolerance: ToleranceBand,
    pub run_methods: bool,
    pub run_performance: bool,
    pub performance_window: Duration,
}

impl CategorySettings {
    /// Settings from the built-in defaults.
    pub fn defaults(category: DeviceCategory) -> Self {
        ConformConfig::default().settings_for(category)
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_async_threshold_ms() -> u64 {
    DEFAULT_ASYNC_THRESHOLD.as_millis() as u64
}

fn default_true() -> bool {
    true
}

fn default_performance_window_secs() -> u64 {
    10
}

fn default_move_timeout_secs() -> u64 {
    60
}

fn default_rotator_tolerance() -> ToleranceBand {
    ToleranceBand::new(1.0, 2.0)
}

fn default_focuser_tolerance() -> ToleranceBand {
    ToleranceBand::new(0.0, 10.0)
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl ConformConfig {
    /// Load defaults overlaid with `CONFORM_` environment variables.
    ///
    /// # Errors
    /// Returns a ConformError if an override cannot be parsed or validation fails.
    pub fn load() -> AppResult<Self> {
        Self::extract(Self::base())
    }

    /// Load defaults, then a TOML file, then `CONFORM_` environment variables.
    ///
    /// # Errors
    /// Returns a ConformError if the file is malformed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let figment = Figment::from(Serialized::defaults(ConformConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CONFORM_").split("__"));
        Self::extract(figment)
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(ConformConfig::default()))
            .merge(Env::prefixed("CONFORM_").split("__"))
    }

    fn extract(figment: Figment) -> AppResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    /// Returns a ConformError with a descriptive message for any validation failure.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConformError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.timing.poll_interval_ms == 0 {
            return Err(ConformError::Configuration(
                "timing.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.phases.performance && self.phases.performance_window_secs == 0 {
            return Err(ConformError::Configuration(
                "phases.performance_window_secs must be greater than zero".to_string(),
            ));
        }

        let timeouts = [
            ("rotator.move_timeout_secs", self.rotator.move_timeout_secs),
            ("focuser.move_timeout_secs", self.focuser.move_timeout_secs),
            (
                "cover_calibrator.cover_timeout_secs",
                self.cover_calibrator.cover_timeout_secs,
            ),
            (
                "cover_calibrator.calibrator_timeout_secs",
                self.cover_calibrator.calibrator_timeout_secs,
            ),
        ];
        for (key, secs) in timeouts {
            if secs == 0 {
                return Err(ConformError::Configuration(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
        }

        let bands = [
            ("rotator.position_tolerance", self.rotator.position_tolerance),
            ("focuser.position_tolerance", self.focuser.position_tolerance),
        ];
        for (key, band) in bands {
            if band.ok < 0.0 || band.info < band.ok {
                return Err(ConformError::Configuration(format!(
                    "{}: bands must satisfy 0 <= ok <= info (ok = {}, info = {})",
                    key, band.ok, band.info
                )));
            }
        }

        Ok(())
    }

    /// Flatten into the settings for one category.
    pub fn settings_for(&self, category: DeviceCategory) -> CategorySettings {
        let (timeout_secs, calibrator_secs, threshold_ms, tolerance) = match category {
            DeviceCategory::Rotator => (
                self.rotator.move_timeout_secs,
                self.rotator.move_timeout_secs,
                self.rotator.async_threshold_ms,
                self.rotator.position_tolerance,
            ),
            DeviceCategory::Focuser => (
                self.focuser.move_timeout_secs,
                self.focuser.move_timeout_secs,
                self.focuser.async_threshold_ms,
                self.focuser.position_tolerance,
            ),
            DeviceCategory::CoverCalibrator => (
                self.cover_calibrator.cover_timeout_secs,
                self.cover_calibrator.calibrator_timeout_secs,
                self.cover_calibrator.async_threshold_ms,
                ToleranceBand::exact(),
            ),
        };

        CategorySettings {
            category,
            async_threshold: Duration::from_millis(
                threshold_ms.unwrap_or(self.timing.async_threshold_ms),
            ),
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms),
            operation_timeout: Duration::from_secs(timeout_secs),
            calibrator_timeout: Duration::from_secs(calibrator_secs),
            tolerance,
            run_methods: self.phases.methods,
            run_performance: self.phases.performance,
            performance_window: Duration::from_secs(self.phases.performance_window_secs),
        }
    }
}
