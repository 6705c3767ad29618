//! Configuration system using Figment.
//!
//! Strongly-typed configuration loaded from:
//! 1. `config/default.toml` (base configuration)
//! 2. Environment variables (prefixed with `GLOVE__`)
//!
//! Every field carries a serde default, so the file is optional and partial
//! overrides work. Validation is separate from parsing: a configuration that
//! deserializes but would silently mis-filter (zero window size, alpha outside
//! `(0, 1]`, no inference workers) is rejected at startup.
//!
//! # Example
//! ```no_run
//! use glove_stream::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! config.validate()?;
//! println!("serving on {}", config.server.bind_addr);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, GloveError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sensor filtering and fusion settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Streaming server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Filter bank, regularization, and IMU settings shared by the streaming and
/// batch paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ring buffer length for moving-average, median, and weighted filters.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Z-score threshold for per-frame outlier replacement.
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    /// Whether the per-frame outlier pass runs before smoothing.
    #[serde(default = "default_true")]
    pub apply_outlier: bool,
    /// Whether per-sensor moving-average smoothing runs.
    #[serde(default = "default_true")]
    pub apply_moving_avg: bool,
    /// Whether per-sensor median smoothing runs. Moving average takes
    /// precedence when both smoothing flags are set.
    #[serde(default)]
    pub apply_median: bool,
    /// EMA coefficient for exponential smoothing of sensors and angles.
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    /// Kalman process noise.
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    /// Kalman measurement noise.
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    /// Gyroscope samples accumulated before calibration completes.
    #[serde(default = "default_calibration_samples")]
    pub calibration_samples_needed: usize,
    /// Full-scale flex sensor reading (ADC dependent).
    #[serde(default = "default_flex_max")]
    pub flex_max: f64,
    /// Integration step for the yaw accumulator, in seconds.
    #[serde(default = "default_yaw_dt")]
    pub yaw_dt: f64,
}

/// Streaming server and inference coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the WebSocket server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Minimum interval between accepted frames per client, in milliseconds.
    /// Frames arriving faster are dropped silently.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_interval_ms: u64,
    /// Number of inference worker tasks. With 1 worker at most one
    /// classifier invocation is in flight at any instant.
    #[serde(default = "default_inference_workers")]
    pub inference_workers: usize,
    /// Capacity of the worker wake-up channel.
    #[serde(default = "default_notify_capacity")]
    pub mailbox_notify_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format (pretty, compact, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions

fn default_window_size() -> usize {
    5
}

fn default_outlier_threshold() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_smoothing_alpha() -> f64 {
    0.3
}

fn default_process_noise() -> f64 {
    0.01
}

fn default_measurement_noise() -> f64 {
    0.1
}

fn default_calibration_samples() -> usize {
    100
}

fn default_flex_max() -> f64 {
    4095.0
}

fn default_yaw_dt() -> f64 {
    0.01
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_rate_limit_ms() -> u64 {
    100
}

fn default_inference_workers() -> usize {
    1
}

fn default_notify_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            outlier_threshold: default_outlier_threshold(),
            apply_outlier: true,
            apply_moving_avg: true,
            apply_median: false,
            smoothing_alpha: default_smoothing_alpha(),
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            calibration_samples_needed: default_calibration_samples(),
            flex_max: default_flex_max(),
            yaw_dt: default_yaw_dt(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rate_limit_interval_ms: default_rate_limit_ms(),
            inference_workers: default_inference_workers(),
            mailbox_notify_capacity: default_notify_capacity(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ServerConfig {
    /// Rate limit interval as a [`Duration`].
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }
}

impl Config {
    /// Load configuration from `config/default.toml` and environment
    /// variables.
    ///
    /// Environment variables override file values with the `GLOVE__` prefix
    /// and `__` as the nesting separator, e.g.
    /// `GLOVE__PIPELINE__WINDOW_SIZE=3`.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/default.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GLOVE__").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading. All violations here are fatal:
    /// running with them would silently mis-filter or deadlock the worker
    /// pool.
    pub fn validate(&self) -> AppResult<()> {
        if self.pipeline.window_size == 0 {
            return Err(GloveError::Configuration(
                "pipeline.window_size must be > 0".to_string(),
            ));
        }
        if self.pipeline.outlier_threshold <= 0.0 {
            return Err(GloveError::Configuration(format!(
                "pipeline.outlier_threshold must be > 0, got {}",
                self.pipeline.outlier_threshold
            )));
        }
        if !(self.pipeline.smoothing_alpha > 0.0 && self.pipeline.smoothing_alpha <= 1.0) {
            return Err(GloveError::Configuration(format!(
                "pipeline.smoothing_alpha must be in (0, 1], got {}",
                self.pipeline.smoothing_alpha
            )));
        }
        if self.pipeline.calibration_samples_needed == 0 {
            return Err(GloveError::Configuration(
                "pipeline.calibration_samples_needed must be > 0".to_string(),
            ));
        }
        if self.pipeline.flex_max <= 0.0 {
            return Err(GloveError::Configuration(format!(
                "pipeline.flex_max must be > 0, got {}",
                self.pipeline.flex_max
            )));
        }
        if self.pipeline.yaw_dt <= 0.0 {
            return Err(GloveError::Configuration(format!(
                "pipeline.yaw_dt must be > 0, got {}",
                self.pipeline.yaw_dt
            )));
        }
        if self.server.inference_workers == 0 {
            return Err(GloveError::Configuration(
                "server.inference_workers must be >= 1".to_string(),
            ));
        }
        if self.server.mailbox_notify_capacity == 0 {
            return Err(GloveError::Configuration(
                "server.mailbox_notify_capacity must be >= 1".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            return Err(GloveError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.telemetry.format.as_str()) {
            return Err(GloveError::Configuration(format!(
                "Invalid telemetry format '{}'. Must be one of: {}",
                self.telemetry.format,
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.window_size, 5);
        assert_eq!(config.pipeline.calibration_samples_needed, 100);
        assert_eq!(config.server.inference_workers, 1);
    }

    #[test]
    fn zero_window_size_is_fatal() {
        let mut config = Config::default();
        config.pipeline.window_size = 0;
        assert!(matches!(
            config.validate(),
            Err(GloveError::Configuration(_))
        ));
    }

    #[test]
    fn alpha_outside_unit_interval_is_fatal() {
        let mut config = Config::default();
        config.pipeline.smoothing_alpha = 0.0;
        assert!(config.validate().is_err());
        config.pipeline.smoothing_alpha = 1.5;
        assert!(config.validate().is_err());
        config.pipeline.smoothing_alpha = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_fatal() {
        let mut config = Config::default();
        config.server.inference_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_log_level_is_fatal() {
        let mut config = Config::default();
        config.telemetry.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let config = Config::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.pipeline.window_size, 5);
        assert!(config.validate().is_ok());
    }
}
